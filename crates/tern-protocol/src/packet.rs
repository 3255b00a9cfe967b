//! Packet format for the tern transfer protocol.
//!
//! ```text
//! RRQ / WRQ   [opcode=1|2 (u16 BE)][filename][0x00][mode][0x00]
//! DATA        [opcode=3][block (u16 BE)][payload, 0..=512 bytes]
//! ACK         [opcode=4][block (u16 BE)]
//! ERROR       [opcode=5][code (u16 BE)][message][0x00]
//! DELETE      [opcode=6][filename][0x00]["octet"][0x00]
//! LIST        [opcode=7][0x00]
//! ```
//!
//! A DATA payload shorter than [`BLOCK_SIZE`] marks the last block of a transfer.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ParseError;

pub const OPCODE_RRQ: u16 = 1;
pub const OPCODE_WRQ: u16 = 2;
pub const OPCODE_DATA: u16 = 3;
pub const OPCODE_ACK: u16 = 4;
pub const OPCODE_ERROR: u16 = 5;
pub const OPCODE_DELETE: u16 = 6;
pub const OPCODE_LIST: u16 = 7;

/// Payload bytes carried by one full DATA block.
pub const BLOCK_SIZE: usize = 512;

/// Opcode plus block number (or error code).
pub const HEADER_SIZE: usize = 4;

/// Largest frame either side will accept.
pub const MAX_FRAME: usize = HEADER_SIZE + BLOCK_SIZE;

/// Receive buffer size. Larger than [`MAX_FRAME`] so oversized datagrams are
/// seen at their real length instead of being silently truncated.
pub const RECV_BUFFER: usize = 1024;

/// The only transfer mode this implementation speaks.
pub const DEFAULT_MODE: &str = "octet";

/// Block number a server acknowledges a successful delete with.
pub const DELETE_OK_BLOCK: u16 = 0xFFFF;

/// Error codes carried in ERROR packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTid,
    FileAlreadyExists,
    NoSuchUser,
    /// A code outside the standard taxonomy, kept as received.
    Other(u16),
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::NotDefined => 0,
            Self::FileNotFound => 1,
            Self::AccessViolation => 2,
            Self::DiskFull => 3,
            Self::IllegalOperation => 4,
            Self::UnknownTid => 5,
            Self::FileAlreadyExists => 6,
            Self::NoSuchUser => 7,
            Self::Other(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => Self::NotDefined,
            1 => Self::FileNotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTid,
            6 => Self::FileAlreadyExists,
            7 => Self::NoSuchUser,
            other => Self::Other(other),
        }
    }

    /// Human-readable message sent when the caller has nothing more specific.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::NotDefined | Self::Other(_) => "Not defined",
            Self::FileNotFound => "File not found",
            Self::AccessViolation => "Access violation",
            Self::DiskFull => "Disk full or allocation exceeded.",
            Self::IllegalOperation => "Illegal TFTP operation",
            Self::UnknownTid => "Unknown transfer ID",
            Self::FileAlreadyExists => "File already exists.",
            Self::NoSuchUser => "No such user",
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "{} (unknown)", code),
            known => write!(f, "{} ({})", known.as_u16(), known.default_message()),
        }
    }
}

/// One protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest { filename: String, mode: String },
    WriteRequest { filename: String, mode: String },
    Data { block: u16, payload: Vec<u8> },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
    List,
    Delete { filename: String, mode: String },
}

impl Packet {
    pub fn read_request(filename: impl Into<String>) -> Self {
        Self::ReadRequest {
            filename: filename.into(),
            mode: DEFAULT_MODE.to_string(),
        }
    }

    pub fn write_request(filename: impl Into<String>) -> Self {
        Self::WriteRequest {
            filename: filename.into(),
            mode: DEFAULT_MODE.to_string(),
        }
    }

    pub fn delete(filename: impl Into<String>) -> Self {
        Self::Delete {
            filename: filename.into(),
            mode: DEFAULT_MODE.to_string(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// ERROR packet with the code's stock message.
    pub fn error_for(code: ErrorCode) -> Self {
        Self::error(code, code.default_message())
    }

    pub fn opcode(&self) -> u16 {
        match self {
            Self::ReadRequest { .. } => OPCODE_RRQ,
            Self::WriteRequest { .. } => OPCODE_WRQ,
            Self::Data { .. } => OPCODE_DATA,
            Self::Ack { .. } => OPCODE_ACK,
            Self::Error { .. } => OPCODE_ERROR,
            Self::Delete { .. } => OPCODE_DELETE,
            Self::List => OPCODE_LIST,
        }
    }

    /// Serialize to wire format. See [`encode`].
    pub fn to_bytes(&self) -> Bytes {
        encode(self)
    }
}

/// Short name of an opcode for logs and error messages.
pub fn opcode_name(opcode: u16) -> &'static str {
    match opcode {
        OPCODE_RRQ => "RRQ",
        OPCODE_WRQ => "WRQ",
        OPCODE_DATA => "DATA",
        OPCODE_ACK => "ACK",
        OPCODE_ERROR => "ERROR",
        OPCODE_DELETE => "DELETE",
        OPCODE_LIST => "LIST",
        _ => "UNKNOWN",
    }
}

/// Read the opcode of a raw frame without decoding the rest.
pub fn peek_opcode(data: &[u8]) -> Option<u16> {
    if data.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([data[0], data[1]]))
}

/// Encode a packet. Callers keep DATA payloads within [`BLOCK_SIZE`].
pub fn encode(packet: &Packet) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_FRAME);
    buf.put_u16(packet.opcode());

    match packet {
        Packet::ReadRequest { filename, mode }
        | Packet::WriteRequest { filename, mode }
        | Packet::Delete { filename, mode } => {
            put_cstr(&mut buf, filename);
            put_cstr(&mut buf, mode);
        }
        Packet::Data { block, payload } => {
            debug_assert!(payload.len() <= BLOCK_SIZE);
            buf.put_u16(*block);
            buf.put_slice(payload);
        }
        Packet::Ack { block } => buf.put_u16(*block),
        Packet::Error { code, message } => {
            buf.put_u16(code.as_u16());
            put_cstr(&mut buf, message);
        }
        Packet::List => buf.put_u8(0),
    }

    buf.freeze()
}

/// Decode a raw frame.
pub fn decode(data: &[u8]) -> Result<Packet, ParseError> {
    if data.len() > MAX_FRAME {
        return Err(ParseError::FrameTooLarge(data.len()));
    }
    let opcode = peek_opcode(data).ok_or(ParseError::MissingOpcode { len: data.len() })?;
    let body = &data[2..];

    let too_short = |min: usize| {
        if data.len() < min {
            Err(ParseError::TooShort {
                opcode,
                len: data.len(),
            })
        } else {
            Ok(())
        }
    };

    match opcode {
        OPCODE_RRQ | OPCODE_WRQ => {
            too_short(4)?;
            let (filename, rest) = take_cstr(body, "filename")?;
            let (mode, _) = take_cstr(rest, "mode")?;
            let filename = filename.to_string();
            let mode = mode.to_string();
            Ok(if opcode == OPCODE_RRQ {
                Packet::ReadRequest { filename, mode }
            } else {
                Packet::WriteRequest { filename, mode }
            })
        }
        OPCODE_DELETE => {
            too_short(3)?;
            let (filename, rest) = take_cstr(body, "filename")?;
            let mode = take_trailing_str(rest, "mode")?;
            Ok(Packet::Delete {
                filename: filename.to_string(),
                mode: mode.to_string(),
            })
        }
        OPCODE_DATA => {
            too_short(HEADER_SIZE)?;
            let payload = &data[HEADER_SIZE..];
            if payload.len() > BLOCK_SIZE {
                return Err(ParseError::PayloadTooLarge(payload.len()));
            }
            Ok(Packet::Data {
                block: u16::from_be_bytes([data[2], data[3]]),
                payload: payload.to_vec(),
            })
        }
        OPCODE_ACK => {
            too_short(HEADER_SIZE)?;
            Ok(Packet::Ack {
                block: u16::from_be_bytes([data[2], data[3]]),
            })
        }
        OPCODE_ERROR => {
            too_short(HEADER_SIZE)?;
            let code = ErrorCode::from_u16(u16::from_be_bytes([data[2], data[3]]));
            let message = take_trailing_str(&data[HEADER_SIZE..], "message")?;
            Ok(Packet::Error {
                code,
                message: message.to_string(),
            })
        }
        OPCODE_LIST => {
            too_short(3)?;
            Ok(Packet::List)
        }
        other => Err(ParseError::UnknownOpcode(other)),
    }
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Split a NUL-terminated string off the front of `data`.
fn take_cstr<'a>(data: &'a [u8], field: &'static str) -> Result<(&'a str, &'a [u8]), ParseError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(ParseError::Unterminated { field })?;
    let s = std::str::from_utf8(&data[..nul]).map_err(|_| ParseError::InvalidString { field })?;
    Ok((s, &data[nul + 1..]))
}

/// Final string of a frame; the terminating NUL is optional.
fn take_trailing_str<'a>(data: &'a [u8], field: &'static str) -> Result<&'a str, ParseError> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    std::str::from_utf8(&data[..end]).map_err(|_| ParseError::InvalidString { field })
}
