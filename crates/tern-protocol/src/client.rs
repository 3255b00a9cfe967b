//! Client-side requests: one fresh socket and one session per request.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::TransferError;
use crate::logging::TransferLogger;
use crate::net::bind_client;
use crate::session::{Role, SessionConfig, TransferSession, TransferSummary};

/// Issues requests against one server's well-known endpoint.
#[derive(Clone)]
pub struct Requester {
    server: SocketAddr,
    config: SessionConfig,
    logger: Option<Arc<dyn TransferLogger>>,
}

impl Requester {
    pub fn new(server: SocketAddr, config: SessionConfig) -> Self {
        Self {
            server,
            config,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Fetch `filename` from the server into `sink`.
    pub fn download<W: Write>(&self, filename: &str, sink: &mut W) -> Result<TransferSummary, TransferError> {
        let socket = bind_client(self.server, self.config.timeout)?;
        self.session(&socket, Role::Reader)?.download(filename, sink)
    }

    /// Store `source` on the server under `filename`.
    pub fn upload<R: Read>(&self, filename: &str, source: &mut R) -> Result<TransferSummary, TransferError> {
        let socket = bind_client(self.server, self.config.timeout)?;
        self.session(&socket, Role::Writer)?.upload(filename, source)
    }

    /// Ask the server to delete `filename`.
    pub fn delete(&self, filename: &str) -> Result<(), TransferError> {
        let socket = bind_client(self.server, self.config.timeout)?;
        self.session(&socket, Role::Writer)?.delete(filename)
    }

    /// Receive the server's file listing into `sink`.
    pub fn list<W: Write>(&self, sink: &mut W) -> Result<TransferSummary, TransferError> {
        let socket = bind_client(self.server, self.config.timeout)?;
        self.session(&socket, Role::Reader)?.list(sink)
    }

    fn session<'s>(&self, socket: &'s std::net::UdpSocket, role: Role) -> Result<TransferSession<'s>, TransferError> {
        let session = TransferSession::client(socket, role, self.server, self.config)?;
        Ok(match self.logger {
            Some(ref logger) => session.with_logger(logger.clone()),
            None => session,
        })
    }
}
