use std::io;

use thiserror::Error;

use crate::packet::{ErrorCode, opcode_name};

fn name_of(opcode: &u16) -> &'static str {
    opcode_name(*opcode)
}

/// A frame that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("frame of {len} bytes has no opcode")]
    MissingOpcode { len: usize },

    #[error("{} frame too short: {len} bytes", name_of(.opcode))]
    TooShort { opcode: u16, len: usize },

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),

    #[error("{field} is not NUL-terminated")]
    Unterminated { field: &'static str },

    #[error("{field} is not valid UTF-8")]
    InvalidString { field: &'static str },

    #[error("data payload of {0} bytes exceeds the block size")]
    PayloadTooLarge(usize),
}

/// Why a transfer session ended without success.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Consecutive receive timeouts used up the retry budget.
    #[error("max retries exceeded ({timeouts} consecutive timeouts)")]
    MaxRetriesExceeded { timeouts: u32 },

    /// The peer sent an ERROR packet.
    #[error("peer error {code}: {message}")]
    Peer { code: ErrorCode, message: String },

    /// A well-formed packet that is not allowed in the current role.
    #[error("illegal {} packet for this transfer", name_of(.opcode))]
    IllegalPacket { opcode: u16 },

    /// The writer's synchronizing acknowledgment carried the wrong block.
    #[error("expected ACK {expected}, peer acknowledged block {block}")]
    UnexpectedAck { expected: u16, block: u16 },

    #[error("malformed packet from peer: {0}")]
    Malformed(#[from] ParseError),

    #[error("cannot write destination: {0}")]
    LocalWrite(#[source] io::Error),

    #[error("cannot read source: {0}")]
    LocalRead(#[source] io::Error),

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),
}

impl TransferError {
    /// Protocol error code that best describes this failure, if it came from the peer.
    pub fn peer_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Peer { code, .. } => Some(*code),
            _ => None,
        }
    }
}
