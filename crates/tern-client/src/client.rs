//! The four client operations.
//!
//! File contents travel compressed: `write` compresses into a transient
//! container before uploading it, `read` downloads the container and expands
//! it into the local directory. Listings travel as plain text.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

use tracing::info;

use tern_huffman::{compress_file, decompress_file};
use tern_protocol::{Requester, TracingLogger, TransferSummary};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::store::{LISTING_FILE, LocalStore};

pub struct Client {
    requester: Requester,
    store: LocalStore,
}

/// What a completed read or write moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Uncompressed size of the file.
    pub file_bytes: u64,
    pub transfer: TransferSummary,
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let requester = Requester::new(config.server, config.session).with_logger(Arc::new(TracingLogger));
        Ok(Self {
            requester,
            store: LocalStore::new(config.local_dir.clone())?,
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Fetch `name` from the server into the local directory.
    pub fn read(&self, name: &str) -> Result<Outcome> {
        let dest = self.store.path(name)?;
        let artifact = self.store.artifact("download");

        let transfer = {
            let mut sink = BufWriter::new(File::create(artifact.path())?);
            let summary = self.requester.download(name, &mut sink)?;
            sink.flush()?;
            summary
        };

        let file_bytes = decompress_file(artifact.path(), &dest)?;
        info!(
            "Read {}: {} bytes ({} on the wire)",
            name, file_bytes, transfer.bytes
        );
        Ok(Outcome {
            file_bytes,
            transfer,
        })
    }

    /// Compress the local file `name` and store it on the server.
    pub fn write(&self, name: &str) -> Result<Outcome> {
        let src = self.store.existing(name)?;
        let file_bytes = fs::metadata(&src)?.len();
        let artifact = self.store.artifact("upload");
        compress_file(&src, artifact.path())?;

        let mut source = BufReader::new(File::open(artifact.path())?);
        let transfer = self.requester.upload(name, &mut source)?;
        info!(
            "Wrote {}: {} bytes ({} on the wire)",
            name, file_bytes, transfer.bytes
        );
        Ok(Outcome {
            file_bytes,
            transfer,
        })
    }

    /// Delete `name` on the server.
    pub fn delete(&self, name: &str) -> Result<()> {
        self.store.path(name)?;
        self.requester.delete(name)?;
        info!("Deleted {} on the server", name);
        Ok(())
    }

    /// Fetch the server's listing, save it as `ls.txt`, and return it.
    pub fn list(&self) -> Result<String> {
        let mut listing = Vec::new();
        self.requester.list(&mut listing)?;
        fs::write(self.store.path(LISTING_FILE)?, &listing)?;
        Ok(String::from_utf8_lossy(&listing).into_owned())
    }
}
