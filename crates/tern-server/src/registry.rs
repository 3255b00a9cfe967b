//! Authoritative set of files the server offers, with active-reader counts.
//!
//! Every check-and-update happens under one lock acquisition, so a delete
//! can never slip in between a read's existence check and its count bump.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RemoveError {
    #[error("file not found")]
    NotFound,
    #[error("file has {0} active readers")]
    ActiveReaders(u32),
}

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<String, u32>,
    /// Names with an upload in progress; not yet visible to readers.
    uploading: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct FileRegistry {
    inner: Mutex<Inner>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `names` with no active readers.
    pub fn seeded_from<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files = names.into_iter().map(|n| (n.into(), 0)).collect();
        Self {
            inner: Mutex::new(Inner {
                files,
                uploading: BTreeSet::new(),
            }),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.lock().files.contains_key(name)
    }

    pub fn reader_count(&self, name: &str) -> Option<u32> {
        self.inner.lock().files.get(name).copied()
    }

    /// Count one more reader of `name`. Returns `None` if the file is absent.
    ///
    /// The count drops again when the guard is dropped.
    pub fn begin_read(self: &Arc<Self>, name: &str) -> Option<ReadGuard> {
        let mut inner = self.inner.lock();
        let count = inner.files.get_mut(name)?;
        *count += 1;
        Some(ReadGuard {
            registry: Arc::clone(self),
            name: name.to_string(),
        })
    }

    /// Release one reader of `name`. No-op if absent; never underflows.
    pub fn end_read(&self, name: &str) {
        if let Some(count) = self.inner.lock().files.get_mut(name) {
            *count = count.saturating_sub(1);
        }
    }

    /// True iff `name` is present and nobody is reading it.
    pub fn can_delete(&self, name: &str) -> bool {
        self.inner.lock().files.get(name) == Some(&0)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.inner.lock().files.remove(name).is_some()
    }

    /// Remove `name` only if it has no active readers.
    pub fn remove_if_idle(&self, name: &str) -> Result<(), RemoveError> {
        let mut inner = self.inner.lock();
        match inner.files.get(name) {
            None => Err(RemoveError::NotFound),
            Some(&n) if n > 0 => Err(RemoveError::ActiveReaders(n)),
            Some(_) => {
                inner.files.remove(name);
                Ok(())
            }
        }
    }

    /// Make `name` available. Returns `false` if it was already present.
    pub fn insert(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.files.contains_key(name) {
            return false;
        }
        inner.files.insert(name.to_string(), 0);
        true
    }

    /// Claim `name` for an upload. Returns `None` if the file exists or
    /// another upload of the same name is still running.
    pub fn reserve_upload(self: &Arc<Self>, name: &str) -> Option<UploadGuard> {
        let mut inner = self.inner.lock();
        if inner.files.contains_key(name) || !inner.uploading.insert(name.to_string()) {
            return None;
        }
        Some(UploadGuard {
            registry: Arc::clone(self),
            name: name.to_string(),
        })
    }

    /// Sorted `(name, active readers)` pairs.
    pub fn snapshot(&self) -> Vec<(String, u32)> {
        self.inner
            .lock()
            .files
            .iter()
            .map(|(name, &count)| (name.clone(), count))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One active reader of a file. Dropping it ends the read.
#[derive(Debug)]
pub struct ReadGuard {
    registry: Arc<FileRegistry>,
    name: String,
}

impl ReadGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.registry.end_read(&self.name);
    }
}

/// A name reserved for an upload in progress.
///
/// [`commit`](UploadGuard::commit) publishes the name; dropping the guard
/// without committing releases the reservation.
#[derive(Debug)]
pub struct UploadGuard {
    registry: Arc<FileRegistry>,
    name: String,
}

impl UploadGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit(self) {
        let mut inner = self.registry.inner.lock();
        inner.uploading.remove(&self.name);
        inner.files.entry(self.name.clone()).or_insert(0);
        // Drop still runs; the name is already out of `uploading`.
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.registry.inner.lock().uploading.remove(&self.name);
    }
}
