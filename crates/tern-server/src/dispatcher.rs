//! Accept loop on the server's well-known endpoint.
//!
//! Only the first packet of each transfer arrives here. The dispatcher
//! checks it, answers the cheap failures itself, and hands everything else
//! to a worker with its own ephemeral socket.

use std::net::{SocketAddr, UdpSocket};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tern_protocol::{
    DEFAULT_MODE, ErrorCode, Packet, RECV_BUFFER, bind_ephemeral, bind_udp, decode, encode,
    is_timeout, opcode_name,
};

use crate::config::ServerConfig;
use crate::janitor::WorkerSpawner;
use crate::storage::validate_name;
use crate::worker::{self, Job, WorkerContext};

pub struct Dispatcher {
    socket: UdpSocket,
    local_addr: SocketAddr,
    ctx: WorkerContext,
    spawner: WorkerSpawner,
}

impl Dispatcher {
    /// Bind the public endpoint.
    pub fn bind(config: &ServerConfig, ctx: WorkerContext, spawner: WorkerSpawner) -> anyhow::Result<Self> {
        let socket = bind_udp(config.bind_addr, config.poll_interval)?;
        let local_addr = socket.local_addr()?;
        info!("Listening on {}", local_addr);
        Ok(Self {
            socket,
            local_addr,
            ctx,
            spawner,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve first packets until `cancel` fires.
    ///
    /// Per-request failures are answered and logged; they never end the loop.
    pub fn run(mut self, cancel: &CancellationToken) {
        let mut buf = vec![0u8; RECV_BUFFER];
        while !cancel.is_cancelled() {
            let (len, peer) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(ref e) if is_timeout(e) => continue,
                Err(e) => {
                    warn!("Receive on public endpoint failed: {}", e);
                    continue;
                }
            };
            self.dispatch(&buf[..len], peer);
        }
        info!("Dispatcher stopped");
    }

    /// Classify one first packet and act on it.
    pub fn dispatch(&mut self, frame: &[u8], peer: SocketAddr) {
        let packet = match decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Malformed request from {}: {}", peer, e);
                self.reply_error(peer, ErrorCode::IllegalOperation);
                return;
            }
        };
        debug!("{} from {}", opcode_name(packet.opcode()), peer);

        match packet {
            Packet::List => self.start(peer, Job::List),

            Packet::ReadRequest { filename, mode } => {
                if !self.check_request(peer, &filename, &mode) {
                    return;
                }
                match self.ctx.registry.begin_read(&filename) {
                    Some(guard) => self.start(peer, Job::Read(guard)),
                    None => {
                        info!("Read {} for {}: not found", filename, peer);
                        self.reply_error(peer, ErrorCode::FileNotFound);
                    }
                }
            }

            Packet::WriteRequest { filename, mode } => {
                if !self.check_request(peer, &filename, &mode) {
                    return;
                }
                match self.ctx.registry.reserve_upload(&filename) {
                    Some(upload) => self.start(peer, Job::Write(upload)),
                    None => {
                        info!("Write {} for {}: already exists", filename, peer);
                        self.reply_error(peer, ErrorCode::FileAlreadyExists);
                    }
                }
            }

            Packet::Delete { filename, mode } => {
                if self.check_request(peer, &filename, &mode) {
                    self.start(peer, Job::Delete(filename));
                }
            }

            other => {
                warn!("Unexpected {} on public endpoint from {}", opcode_name(other.opcode()), peer);
                self.reply_error(peer, ErrorCode::IllegalOperation);
            }
        }
    }

    /// Mode and file name checks shared by every named request.
    fn check_request(&self, peer: SocketAddr, filename: &str, mode: &str) -> bool {
        if !mode.eq_ignore_ascii_case(DEFAULT_MODE) {
            warn!("Unsupported mode {:?} from {}", mode, peer);
            self.reply_error(peer, ErrorCode::IllegalOperation);
            return false;
        }
        if let Err(e) = validate_name(filename) {
            warn!("Rejected request from {}: {}", peer, e);
            self.reply_error(peer, ErrorCode::AccessViolation);
            return false;
        }
        true
    }

    fn start(&mut self, peer: SocketAddr, job: Job) {
        let socket = match bind_ephemeral(self.local_addr.ip(), peer, self.ctx.session.timeout) {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Cannot bind transfer socket for {}: {}", peer, e);
                self.reply_error(peer, ErrorCode::NotDefined);
                return;
            }
        };

        let label = job.label();
        let ctx = self.ctx.clone();
        match self.spawner.spawn(label, move || worker::run(ctx, socket, peer, job)) {
            Ok(id) => debug!("Worker {} ({}) started for {}", id, label, peer),
            Err(e) => {
                warn!("Cannot spawn worker for {}: {}", peer, e);
                self.reply_error(peer, ErrorCode::NotDefined);
            }
        }
    }

    fn reply_error(&self, peer: SocketAddr, code: ErrorCode) {
        if let Err(e) = self.socket.send_to(&encode(&Packet::error_for(code)), peer) {
            warn!("Failed to send error to {}: {}", peer, e);
        }
    }
}
