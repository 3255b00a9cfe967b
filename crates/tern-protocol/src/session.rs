//! Stop-and-wait transfer session.
//!
//! ```text
//! Handshaking ──> Transferring ──> Succeeded
//!      │               │
//!      └───────────────┴─────────> Aborted
//! ```
//!
//! One session drives one transfer over one socket, in one of two roles:
//!
//! - **Reader** accepts DATA/ERROR, writes each in-sequence block to a sink
//!   and acknowledges it. A block shorter than [`BLOCK_SIZE`] ends the transfer.
//! - **Writer** accepts ACK/ERROR, sending the next block from its source
//!   each time the outstanding one is acknowledged.
//!
//! At most one block is ever unacknowledged. The peer's endpoint (the
//! transfer ID) is pinned from the first reply; anything from elsewhere gets
//! an UnknownTID error and is otherwise ignored.

use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::TransferError;
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::net::is_timeout;
use crate::packet::*;

/// Receive timeout per attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive timeouts tolerated before a session gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reader,
    Writer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Transferring,
    Succeeded,
    Aborted,
}

/// Budget of consecutive receive timeouts.
///
/// Reset to its initial value on every successful receive; never goes below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    initial: u32,
    remaining: u32,
}

impl RetryBudget {
    pub fn new(initial: u32) -> Self {
        Self {
            initial,
            remaining: initial,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn reset(&mut self) {
        self.remaining = self.initial;
    }

    /// Record one timeout. Returns `false` once the budget is used up.
    pub fn consume(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Counters reported when a session ends successfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// DATA blocks sent (writer) or accepted (reader).
    pub blocks: u32,
    /// Payload bytes sent or written.
    pub bytes: u64,
    /// Packets re-sent after a timeout.
    pub retransmits: u32,
    /// Receive timeouts seen over the whole session.
    pub timeouts: u32,
}

/// Which endpoint the session will talk to.
#[derive(Debug, Clone, Copy)]
enum PeerBinding {
    /// Client side before the first reply: only the server's IP is known;
    /// its transfer port is learned from the reply.
    Learning { server: SocketAddr },
    Pinned(SocketAddr),
}

impl PeerBinding {
    fn ip(&self) -> IpAddr {
        match self {
            Self::Learning { server } => server.ip(),
            Self::Pinned(addr) => addr.ip(),
        }
    }

    fn pinned(&self) -> Option<SocketAddr> {
        match self {
            Self::Pinned(addr) => Some(*addr),
            Self::Learning { .. } => None,
        }
    }
}

/// One stop-and-wait transfer over a borrowed socket.
pub struct TransferSession<'a> {
    socket: &'a UdpSocket,
    role: Role,
    component: &'static str,
    peer: PeerBinding,
    state: SessionState,
    /// Reader: next DATA block wanted. Writer: block whose ACK is awaited.
    expected_block: u16,
    /// Writer: the outstanding block was shorter than a full block.
    final_sent: bool,
    retries: RetryBudget,
    /// Last packet sent to the pinned peer, re-sent on timeout.
    last_sent: Option<Bytes>,
    summary: TransferSummary,
    logger: Option<Arc<dyn TransferLogger>>,
    recv_buf: Vec<u8>,
}

impl<'a> TransferSession<'a> {
    /// Session toward a server whose transfer port is not yet known.
    ///
    /// Replies must come from `server`'s IP; the first one pins the port.
    pub fn client(
        socket: &'a UdpSocket,
        role: Role,
        server: SocketAddr,
        config: SessionConfig,
    ) -> Result<Self, TransferError> {
        Self::new(socket, role, "client", PeerBinding::Learning { server }, config)
    }

    /// Session toward a peer whose endpoint is already known (server side).
    pub fn pinned(
        socket: &'a UdpSocket,
        role: Role,
        peer: SocketAddr,
        config: SessionConfig,
    ) -> Result<Self, TransferError> {
        Self::new(socket, role, "server", PeerBinding::Pinned(peer), config)
    }

    fn new(
        socket: &'a UdpSocket,
        role: Role,
        component: &'static str,
        peer: PeerBinding,
        config: SessionConfig,
    ) -> Result<Self, TransferError> {
        socket.set_read_timeout(Some(config.timeout))?;
        Ok(Self {
            socket,
            role,
            component,
            peer,
            state: SessionState::Handshaking,
            expected_block: match role {
                Role::Reader => 1,
                Role::Writer => 0,
            },
            final_sent: false,
            retries: RetryBudget::new(config.max_retries.max(1)),
            last_sent: None,
            summary: TransferSummary::default(),
            logger: None,
            recv_buf: vec![0u8; RECV_BUFFER],
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.pinned()
    }

    pub fn expected_block(&self) -> u16 {
        self.expected_block
    }

    pub fn retries(&self) -> RetryBudget {
        self.retries
    }

    pub fn summary(&self) -> TransferSummary {
        self.summary
    }

    // ── Entry points ───────────────────────────────────────────────────

    /// Client read: send RRQ, then receive the file into `sink`.
    pub fn download<W: Write>(&mut self, filename: &str, sink: &mut W) -> Result<TransferSummary, TransferError> {
        self.expect_role(Role::Reader);
        self.started();
        self.send_request(&Packet::read_request(filename))?;
        self.run_reader(sink)
    }

    /// Client write: send WRQ, wait for ACK 0, then send `source`.
    pub fn upload<R: Read>(&mut self, filename: &str, source: &mut R) -> Result<TransferSummary, TransferError> {
        self.expect_role(Role::Writer);
        self.started();
        self.send_request(&Packet::write_request(filename))?;
        self.run_writer(source)
    }

    /// Client listing: send LIST, then receive the listing like a read.
    pub fn list<W: Write>(&mut self, sink: &mut W) -> Result<TransferSummary, TransferError> {
        self.expect_role(Role::Reader);
        self.started();
        self.send_request(&Packet::List)?;
        self.run_reader(sink)
    }

    /// Client delete: send DELETE and wait for the single OK acknowledgment.
    pub fn delete(&mut self, filename: &str) -> Result<(), TransferError> {
        self.expect_role(Role::Writer);
        self.started();
        self.send_request(&Packet::delete(filename))?;
        self.expected_block = DELETE_OK_BLOCK;

        match self.next_packet()? {
            Packet::Ack { block } if block == DELETE_OK_BLOCK => {
                self.state = SessionState::Succeeded;
                Ok(())
            }
            Packet::Ack { block } => Err(self.fail(TransferError::UnexpectedAck {
                expected: DELETE_OK_BLOCK,
                block,
            })),
            Packet::Error { code, message } => Err(self.peer_error(code, message)),
            other => Err(self.abort_illegal(other.opcode())),
        }
    }

    /// Server side of a read: send DATA 1 to the pinned peer and keep
    /// sending as blocks are acknowledged.
    pub fn serve<R: Read>(&mut self, source: &mut R) -> Result<TransferSummary, TransferError> {
        self.expect_role(Role::Writer);
        self.started();
        self.send_next_block(source)?;
        self.run_writer(source)
    }

    /// Server side of a write: send ACK 0 to the pinned peer, then receive.
    pub fn accept<W: Write>(&mut self, sink: &mut W) -> Result<TransferSummary, TransferError> {
        self.expect_role(Role::Reader);
        self.started();
        self.send_tracked(&Packet::Ack { block: 0 })?;
        self.run_reader(sink)
    }

    // ── Role loops ─────────────────────────────────────────────────────

    fn run_reader<W: Write>(&mut self, sink: &mut W) -> Result<TransferSummary, TransferError> {
        loop {
            let (block, payload) = match self.next_packet()? {
                Packet::Data { block, payload } => (block, payload),
                Packet::Error { code, message } => return Err(self.peer_error(code, message)),
                other => return Err(self.abort_illegal(other.opcode())),
            };

            if block != self.expected_block {
                let last_good = self.expected_block.wrapping_sub(1);
                self.emit(TransferEvent::DuplicateBlock {
                    block,
                    expected: self.expected_block,
                });
                self.send_tracked(&Packet::Ack { block: last_good })?;
                continue;
            }

            if let Err(e) = sink.write_all(&payload) {
                return Err(self.abort(ErrorCode::DiskFull, TransferError::LocalWrite(e)));
            }

            self.state = SessionState::Transferring;
            self.summary.blocks += 1;
            self.summary.bytes += payload.len() as u64;
            self.emit(TransferEvent::BlockReceived {
                block,
                len: payload.len(),
            });

            // The last ACK promises the data is stored, so the sink is
            // flushed first and a failure goes to the writer instead.
            let last = payload.len() < BLOCK_SIZE;
            if last {
                if let Err(e) = sink.flush() {
                    return Err(self.abort(ErrorCode::DiskFull, TransferError::LocalWrite(e)));
                }
            }

            self.send_tracked(&Packet::Ack { block })?;
            self.expected_block = self.expected_block.wrapping_add(1);

            if last {
                return Ok(self.succeed());
            }
        }
    }

    fn run_writer<R: Read>(&mut self, source: &mut R) -> Result<TransferSummary, TransferError> {
        loop {
            let block = match self.next_packet()? {
                Packet::Ack { block } => block,
                Packet::Error { code, message } => return Err(self.peer_error(code, message)),
                other => return Err(self.abort_illegal(other.opcode())),
            };

            if block != self.expected_block {
                if self.awaiting_sync() {
                    let err = TransferError::UnexpectedAck {
                        expected: self.expected_block,
                        block,
                    };
                    return Err(self.abort(ErrorCode::IllegalOperation, err));
                }
                self.emit(TransferEvent::StaleAck {
                    block,
                    expected: self.expected_block,
                });
                continue;
            }

            if self.final_sent {
                return Ok(self.succeed());
            }
            self.send_next_block(source)?;
        }
    }

    /// Writer still waiting for the ACK 0 that answers its WRQ.
    fn awaiting_sync(&self) -> bool {
        self.state == SessionState::Handshaking && self.expected_block == 0
    }

    /// Read up to one block from `source` and send it as the next DATA.
    ///
    /// A source that ends exactly on a block boundary still gets a short
    /// (empty) final block so the reader sees the end of the transfer.
    fn send_next_block<R: Read>(&mut self, source: &mut R) -> Result<(), TransferError> {
        let block = self.expected_block.wrapping_add(1);
        let mut payload = Vec::with_capacity(BLOCK_SIZE);
        if let Err(e) = source.by_ref().take(BLOCK_SIZE as u64).read_to_end(&mut payload) {
            return Err(self.abort(ErrorCode::NotDefined, TransferError::LocalRead(e)));
        }

        let len = payload.len();
        self.send_tracked(&Packet::Data { block, payload })?;
        self.state = SessionState::Transferring;
        self.expected_block = block;
        self.final_sent = len < BLOCK_SIZE;
        self.summary.blocks += 1;
        self.summary.bytes += len as u64;
        self.emit(TransferEvent::BlockSent { block, len });
        Ok(())
    }

    // ── Receive step ───────────────────────────────────────────────────

    /// Wait for the next packet from the peer.
    ///
    /// Handles timeouts and retransmission, the retry budget, transfer-ID
    /// checks and decoding. Returns only packets from the pinned peer.
    fn next_packet(&mut self) -> Result<Packet, TransferError> {
        loop {
            let (len, src) = match self.socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(ref e) if is_timeout(e) => {
                    self.summary.timeouts += 1;
                    if !self.retries.consume() {
                        let err = TransferError::MaxRetriesExceeded {
                            timeouts: self.retries.initial(),
                        };
                        return Err(self.fail(err));
                    }
                    self.emit(TransferEvent::Timeout {
                        remaining: self.retries.remaining(),
                    });
                    self.retransmit()?;
                    continue;
                }
                Err(e) => return Err(self.fail(TransferError::Socket(e))),
            };

            self.retries.reset();

            if !self.accept_source(src) {
                self.emit(TransferEvent::UnknownTid { from: src });
                self.send_to(&Packet::error_for(ErrorCode::UnknownTid), src);
                continue;
            }

            return match decode(&self.recv_buf[..len]) {
                Ok(packet) => Ok(packet),
                Err(e) => Err(self.abort(ErrorCode::IllegalOperation, TransferError::Malformed(e))),
            };
        }
    }

    /// Check `src` against the transfer ID, pinning it if this is the first reply.
    fn accept_source(&mut self, src: SocketAddr) -> bool {
        match self.peer {
            PeerBinding::Pinned(peer) => peer == src,
            PeerBinding::Learning { .. } if src.ip() == self.peer.ip() => {
                self.peer = PeerBinding::Pinned(src);
                self.emit(TransferEvent::PeerPinned { peer: src });
                true
            }
            PeerBinding::Learning { .. } => false,
        }
    }

    fn retransmit(&mut self) -> Result<(), TransferError> {
        let (Some(peer), Some(frame)) = (self.peer.pinned(), self.last_sent.clone()) else {
            return Ok(());
        };
        if let Err(e) = self.socket.send_to(&frame, peer) {
            return Err(self.fail(TransferError::Socket(e)));
        }
        self.summary.retransmits += 1;
        self.emit(TransferEvent::Retransmit {
            opcode: peek_opcode(&frame).unwrap_or_default(),
        });
        Ok(())
    }

    // ── Send helpers ───────────────────────────────────────────────────

    /// Send the opening request to the server's well-known endpoint.
    /// Requests are never retransmitted.
    fn send_request(&mut self, packet: &Packet) -> Result<(), TransferError> {
        let PeerBinding::Learning { server } = self.peer else {
            return Err(self.fail(TransferError::IllegalPacket {
                opcode: packet.opcode(),
            }));
        };
        if let Err(e) = self.socket.send_to(&encode(packet), server) {
            return Err(self.fail(TransferError::Socket(e)));
        }
        Ok(())
    }

    /// Send to the pinned peer and remember the frame for retransmission.
    fn send_tracked(&mut self, packet: &Packet) -> Result<(), TransferError> {
        let Some(peer) = self.peer.pinned() else {
            return Err(self.fail(TransferError::IllegalPacket {
                opcode: packet.opcode(),
            }));
        };
        let frame = encode(packet);
        if let Err(e) = self.socket.send_to(&frame, peer) {
            return Err(self.fail(TransferError::Socket(e)));
        }
        self.last_sent = Some(frame);
        Ok(())
    }

    /// Best-effort send for error notices; failures are only logged.
    fn send_to(&self, packet: &Packet, dest: SocketAddr) {
        if let Err(e) = self.socket.send_to(&encode(packet), dest) {
            tracing::warn!("failed to send {} to {}: {}", opcode_name(packet.opcode()), dest, e);
        }
    }

    // ── Terminal states ────────────────────────────────────────────────

    fn succeed(&mut self) -> TransferSummary {
        self.state = SessionState::Succeeded;
        self.emit(TransferEvent::TransferComplete {
            blocks: self.summary.blocks,
            bytes: self.summary.bytes,
        });
        self.summary
    }

    /// Abort without telling the peer.
    fn fail(&mut self, err: TransferError) -> TransferError {
        self.state = SessionState::Aborted;
        self.emit(TransferEvent::Aborted {
            reason: err.to_string(),
        });
        err
    }

    /// Abort and send the peer an ERROR with `code`.
    fn abort(&mut self, code: ErrorCode, err: TransferError) -> TransferError {
        let dest = self.peer.pinned();
        if let Some(dest) = dest {
            self.send_to(&Packet::error_for(code), dest);
        }
        self.fail(err)
    }

    fn abort_illegal(&mut self, opcode: u16) -> TransferError {
        self.abort(ErrorCode::IllegalOperation, TransferError::IllegalPacket { opcode })
    }

    /// The peer ended the transfer; ERROR packets are never answered.
    fn peer_error(&mut self, code: ErrorCode, message: String) -> TransferError {
        self.fail(TransferError::Peer { code, message })
    }

    fn started(&self) {
        let local_addr = self
            .socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into());
        self.emit(TransferEvent::SessionStarted {
            role: self.role,
            local_addr,
        });
    }

    fn expect_role(&self, role: Role) {
        debug_assert_eq!(self.role, role, "session entry point used with the wrong role");
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(ref logger) = self.logger {
            logger.log(TransferLog {
                component: self.component,
                peer: self.peer.pinned(),
                event,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget_counts_down_and_resets() {
        let mut budget = RetryBudget::new(3);
        assert!(budget.consume());
        assert!(budget.consume());
        assert_eq!(budget.remaining(), 1);
        budget.reset();
        assert_eq!(budget.remaining(), 3);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(!budget.consume());
        assert!(budget.is_exhausted());
    }

    #[test]
    fn retry_budget_never_goes_negative() {
        let mut budget = RetryBudget::new(1);
        for _ in 0..10 {
            assert!(!budget.consume());
        }
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn new_sessions_start_handshaking() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server: SocketAddr = "127.0.0.1:6969".parse().unwrap();

        let reader = TransferSession::client(&socket, Role::Reader, server, SessionConfig::default()).unwrap();
        assert_eq!(reader.state(), SessionState::Handshaking);
        assert_eq!(reader.expected_block(), 1);
        assert_eq!(reader.peer(), None);

        let writer = TransferSession::pinned(&socket, Role::Writer, server, SessionConfig::default()).unwrap();
        assert_eq!(writer.expected_block(), 0);
        assert_eq!(writer.peer(), Some(server));
        assert_eq!(writer.retries().remaining(), DEFAULT_MAX_RETRIES);
    }
}
