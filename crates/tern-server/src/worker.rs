//! Per-transfer workers.
//!
//! Each job runs on its own thread with its own ephemeral socket, so the
//! dispatcher's public endpoint only ever sees first packets.

use std::fmt::Write as _;
use std::io::{self, BufReader, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use tracing::{info, warn};

use tern_protocol::{
    DELETE_OK_BLOCK, ErrorCode, Packet, Role, SessionConfig, TransferError, TransferLogger,
    TransferSession, encode,
};

use crate::registry::{FileRegistry, ReadGuard, RemoveError, UploadGuard};
use crate::storage::{StagedFile, Storage};

/// Shared state every worker needs.
#[derive(Clone)]
pub struct WorkerContext {
    pub storage: Arc<Storage>,
    pub registry: Arc<FileRegistry>,
    pub session: SessionConfig,
    pub logger: Arc<dyn TransferLogger>,
}

/// What a worker has been asked to do.
#[derive(Debug)]
pub enum Job {
    /// Serve a file; the guard holds its reader count for the whole transfer.
    Read(ReadGuard),
    /// Receive a file; the guard reserves its name until committed.
    Write(UploadGuard),
    Delete(String),
    List,
}

impl Job {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::Delete(_) => "delete",
            Self::List => "list",
        }
    }
}

/// Run one job to completion on `socket`, talking only to `peer`.
pub fn run(ctx: WorkerContext, socket: UdpSocket, peer: SocketAddr, job: Job) {
    match job {
        Job::Read(guard) => serve_file(&ctx, &socket, peer, guard),
        Job::Write(upload) => receive_file(&ctx, &socket, peer, upload),
        Job::Delete(name) => delete_file(&ctx, &socket, peer, &name),
        Job::List => serve_listing(&ctx, &socket, peer),
    }
}

fn session<'a>(ctx: &WorkerContext, socket: &'a UdpSocket, role: Role, peer: SocketAddr) -> Option<TransferSession<'a>> {
    match TransferSession::pinned(socket, role, peer, ctx.session) {
        Ok(session) => Some(session.with_logger(ctx.logger.clone())),
        Err(e) => {
            warn!("Cannot start session for {}: {}", peer, e);
            None
        }
    }
}

fn reply(socket: &UdpSocket, peer: SocketAddr, packet: &Packet) {
    if let Err(e) = socket.send_to(&encode(packet), peer) {
        warn!("Failed to reply to {}: {}", peer, e);
    }
}

fn report(what: &str, name: &str, peer: SocketAddr, result: &Result<tern_protocol::TransferSummary, TransferError>) {
    match result {
        Ok(summary) => info!(
            "{} {} for {} done: {} blocks, {} bytes, {} retransmits",
            what, name, peer, summary.blocks, summary.bytes, summary.retransmits
        ),
        Err(e) => warn!("{} {} for {} failed: {}", what, name, peer, e),
    }
}

// ── Read ───────────────────────────────────────────────────────────────

fn serve_file(ctx: &WorkerContext, socket: &UdpSocket, peer: SocketAddr, guard: ReadGuard) {
    let file = match ctx.storage.open(guard.name()) {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot open {}: {}", guard.name(), e);
            reply(socket, peer, &Packet::error_for(ErrorCode::FileNotFound));
            return;
        }
    };

    let Some(mut session) = session(ctx, socket, Role::Writer, peer) else {
        return;
    };
    let result = session.serve(&mut BufReader::new(file));
    report("Read", guard.name(), peer, &result);
}

// ── Write ──────────────────────────────────────────────────────────────

/// Sink for an incoming upload.
///
/// The session flushes its sink before acknowledging the final block, so
/// `flush` here commits the staging file and publishes the name. A failure
/// reaches the writer as DiskFull instead of a last ACK.
pub struct UploadSink {
    staged: Option<StagedFile>,
    upload: Option<UploadGuard>,
}

impl UploadSink {
    pub fn new(staged: StagedFile, upload: UploadGuard) -> Self {
        Self {
            staged: Some(staged),
            upload: Some(upload),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.staged.is_none() && self.upload.is_none()
    }
}

impl Write for UploadSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.staged.as_mut() {
            Some(staged) => staged.write(buf),
            None => Err(io::Error::other("upload already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(staged) = self.staged.take() else {
            return Ok(());
        };
        staged.commit()?;
        if let Some(upload) = self.upload.take() {
            upload.commit();
        }
        Ok(())
    }
}

fn receive_file(ctx: &WorkerContext, socket: &UdpSocket, peer: SocketAddr, upload: UploadGuard) {
    let staged = match ctx.storage.stage(upload.name()) {
        Ok(staged) => staged,
        Err(e) => {
            warn!("Cannot stage {}: {}", upload.name(), e);
            reply(socket, peer, &Packet::error_for(ErrorCode::DiskFull));
            return;
        }
    };

    let Some(mut session) = session(ctx, socket, Role::Reader, peer) else {
        return;
    };
    let name = upload.name().to_string();
    // dropping an uncommitted sink removes the staging file and the reservation
    let mut sink = UploadSink::new(staged, upload);
    let result = session.accept(&mut sink);
    report("Write", &name, peer, &result);
}

// ── Delete ─────────────────────────────────────────────────────────────

fn delete_file(ctx: &WorkerContext, socket: &UdpSocket, peer: SocketAddr, name: &str) {
    let response = match ctx.registry.remove_if_idle(name) {
        Ok(()) => match ctx.storage.delete_file(name) {
            Ok(()) => {
                info!("Deleted {} for {}", name, peer);
                Packet::Ack {
                    block: DELETE_OK_BLOCK,
                }
            }
            Err(e) => {
                warn!("Delete {}: {}", name, e);
                ctx.registry.insert(name);
                Packet::error(ErrorCode::AccessViolation, format!("cannot delete: {}", e))
            }
        },
        Err(RemoveError::NotFound) => Packet::error_for(ErrorCode::FileNotFound),
        Err(RemoveError::ActiveReaders(n)) => {
            info!("Delete {} refused: {} active readers", name, n);
            Packet::error(
                ErrorCode::NotDefined,
                format!("File has active readers ({})", n),
            )
        }
    };
    reply(socket, peer, &response);
}

// ── List ───────────────────────────────────────────────────────────────

/// One line per file: `<name>\t [Active Readers] : <count>`.
pub fn format_listing(entries: &[(String, u32)]) -> String {
    let mut out = String::new();
    for (name, readers) in entries {
        let _ = writeln!(out, "{}\t [Active Readers] : {}", name, readers);
    }
    out
}

fn serve_listing(ctx: &WorkerContext, socket: &UdpSocket, peer: SocketAddr) {
    let listing = format_listing(&ctx.registry.snapshot());
    let transient = match ctx.storage.write_transient("list", listing.as_bytes()) {
        Ok(t) => t,
        Err(e) => {
            warn!("Cannot write listing: {}", e);
            reply(socket, peer, &Packet::error_for(ErrorCode::DiskFull));
            return;
        }
    };
    let file = match std::fs::File::open(transient.path()) {
        Ok(f) => f,
        Err(e) => {
            warn!("Cannot reopen listing: {}", e);
            reply(socket, peer, &Packet::error_for(ErrorCode::NotDefined));
            return;
        }
    };

    let Some(mut session) = session(ctx, socket, Role::Writer, peer) else {
        return;
    };
    let result = session.serve(&mut BufReader::new(file));
    report("List", "", peer, &result);
}
