//! Transfer logging trait for structured session logs.
//!
//! Sessions on both sides (client and server workers) report what happens
//! on the wire through a [`TransferLogger`], so the binaries decide where
//! the events go.

use std::fmt;
use std::net::SocketAddr;

use crate::session::Role;

/// Structured log entry for a transfer session.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub peer: Option<SocketAddr>,
    pub event: TransferEvent,
}

/// Session events that can be logged.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Session created on a local socket
    SessionStarted { role: Role, local_addr: String },
    /// First reply arrived; the peer's endpoint is now fixed
    PeerPinned { peer: SocketAddr },
    /// DATA block sent
    BlockSent { block: u16, len: usize },
    /// DATA block accepted and written
    BlockReceived { block: u16, len: usize },
    /// Out-of-sequence DATA; last good block re-acknowledged
    DuplicateBlock { block: u16, expected: u16 },
    /// Out-of-sequence ACK ignored
    StaleAck { block: u16, expected: u16 },
    /// Receive timed out
    Timeout { remaining: u32 },
    /// Last packet re-sent after a timeout
    Retransmit { opcode: u16 },
    /// Packet from an endpoint other than the pinned peer
    UnknownTid { from: SocketAddr },
    /// Transfer complete
    TransferComplete { blocks: u32, bytes: u64 },
    /// Session ended without success
    Aborted { reason: String },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStarted { role, local_addr } => {
                write!(f, "session_started role={:?} local={}", role, local_addr)
            }
            Self::PeerPinned { peer } => write!(f, "peer_pinned tid={}", peer),
            Self::BlockSent { block, len } => write!(f, "block_sent block={} len={}", block, len),
            Self::BlockReceived { block, len } => {
                write!(f, "block_received block={} len={}", block, len)
            }
            Self::DuplicateBlock { block, expected } => {
                write!(f, "duplicate_block block={} expected={}", block, expected)
            }
            Self::StaleAck { block, expected } => {
                write!(f, "stale_ack block={} expected={}", block, expected)
            }
            Self::Timeout { remaining } => write!(f, "timeout retries_left={}", remaining),
            Self::Retransmit { opcode } => {
                write!(f, "retransmit {}", crate::packet::opcode_name(*opcode))
            }
            Self::UnknownTid { from } => write!(f, "unknown_tid from={}", from),
            Self::TransferComplete { blocks, bytes } => {
                write!(f, "transfer_complete blocks={} bytes={}", blocks, bytes)
            }
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing or
/// discard entries.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        let peer = entry
            .peer
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        // info for lifecycle, debug for per-block traffic
        match &entry.event {
            TransferEvent::SessionStarted { .. }
            | TransferEvent::PeerPinned { .. }
            | TransferEvent::TransferComplete { .. } => {
                tracing::info!(component = entry.component, peer = %peer, "{}", entry.event);
            }
            TransferEvent::UnknownTid { .. } | TransferEvent::Aborted { .. } => {
                tracing::warn!(component = entry.component, peer = %peer, "{}", entry.event);
            }
            _ => {
                tracing::debug!(component = entry.component, peer = %peer, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
