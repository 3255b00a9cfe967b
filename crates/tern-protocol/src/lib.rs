/// Tern protocol: stop-and-wait file transfer over UDP.
///
/// Provides:
/// - Packet codec for the seven message kinds (RRQ, WRQ, DATA, ACK, ERROR, DELETE, LIST)
/// - Lock-step transfer sessions in reader or writer role
/// - Transfer-ID pinning and UnknownTID rejection
/// - Timeout retransmission with a bounded retry budget
/// - Socket helpers for per-transfer ephemeral endpoints

pub mod client;
pub mod error;
pub mod logging;
pub mod net;
pub mod packet;
pub mod session;

// Re-export key types for convenience.
pub use client::Requester;
pub use error::{ParseError, TransferError};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use net::{bind_client, bind_ephemeral, bind_udp, is_timeout};
pub use packet::{
    BLOCK_SIZE, DEFAULT_MODE, DELETE_OK_BLOCK, ErrorCode, MAX_FRAME, Packet, RECV_BUFFER, decode,
    encode, opcode_name, peek_opcode,
};
pub use session::{
    RetryBudget, Role, SessionConfig, SessionState, TransferSession, TransferSummary,
};
