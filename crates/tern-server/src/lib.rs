//! tern-server: stop-and-wait file server.
//!
//! Thread layout: one dispatcher thread on the public endpoint, one janitor
//! reaping finished workers, one worker thread per active transfer.

pub mod config;
pub mod dispatcher;
pub mod janitor;
pub mod registry;
pub mod storage;
pub mod worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tern_protocol::TracingLogger;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use janitor::{Janitor, WorkerSet, WorkerSpawner, worker_pool};
pub use registry::{FileRegistry, ReadGuard, RemoveError, UploadGuard};
pub use storage::{Storage, StorageError};

/// A bound server, ready to run.
pub struct Server {
    dispatcher: Dispatcher,
    janitor: Janitor,
    registry: Arc<FileRegistry>,
    cancel: CancellationToken,
}

impl Server {
    /// Open storage, seed the registry from it, and bind the public endpoint.
    pub fn bind(config: &ServerConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(config.storage_dir.clone())?);
        let names = storage.scan()?;
        info!("Serving {} files", names.len());
        let registry = Arc::new(FileRegistry::seeded_from(names));

        let ctx = worker::WorkerContext {
            storage,
            registry: registry.clone(),
            session: config.session,
            logger: Arc::new(TracingLogger),
        };
        let (spawner, janitor) = worker_pool(config.janitor_interval, config.poll_interval, cancel.clone());
        let dispatcher = Dispatcher::bind(config, ctx, spawner)?;

        Ok(Self {
            dispatcher,
            janitor,
            registry,
            cancel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.dispatcher.local_addr()
    }

    pub fn registry(&self) -> Arc<FileRegistry> {
        self.registry.clone()
    }

    /// Serve until the cancellation token fires, then wait for every worker.
    pub fn run(self) -> anyhow::Result<()> {
        let Server {
            dispatcher,
            janitor,
            cancel,
            ..
        } = self;

        let janitor = thread::Builder::new()
            .name("tern-janitor".into())
            .spawn(move || janitor.run())?;

        // returning drops the spawner, which lets the janitor finish
        dispatcher.run(&cancel);

        let joined = janitor.join().map_err(|_| anyhow!("janitor thread panicked"))?;
        info!("Shutdown complete ({} workers joined)", joined);
        Ok(())
    }
}
