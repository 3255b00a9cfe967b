//! The client's local file directory and its transient compression artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ClientError, Result};

/// Name the listing is saved under in the local directory.
pub const LISTING_FILE: &str = "ls.txt";

const ARTIFACT_PREFIX: &str = ".tern-";

#[derive(Debug)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        debug!("Local directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `name` in the local directory. Only plain file names are accepted.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let bad = name.is_empty()
            || name == "."
            || name.contains(['/', '\\', '\0'])
            || name.contains("..");
        if bad {
            return Err(ClientError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Path of an existing local file.
    pub fn existing(&self, name: &str) -> Result<PathBuf> {
        let path = self.path(name)?;
        if !path.is_file() {
            return Err(ClientError::MissingLocalFile(path));
        }
        Ok(path)
    }

    /// A fresh transient path, removed when the returned handle drops.
    pub fn artifact(&self, kind: &str) -> Artifact {
        Artifact {
            path: self
                .dir
                .join(format!("{}{}-{}.huff", ARTIFACT_PREFIX, kind, Uuid::new_v4())),
        }
    }
}

/// Compressed intermediate file for one transfer.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if fs::remove_file(&self.path).is_ok() {
            info!("Removed transient {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.path("file.txt").is_ok());
        for bad in ["", "../up", "a/b", "c:\\x"] {
            assert!(matches!(store.path(bad), Err(ClientError::InvalidName(_))));
        }
        assert!(matches!(
            store.existing("absent.txt"),
            Err(ClientError::MissingLocalFile(_))
        ));
    }

    #[test]
    fn artifacts_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf()).unwrap();
        let artifact = store.artifact("upload");
        fs::write(artifact.path(), b"x").unwrap();
        let path = artifact.path().to_path_buf();
        drop(artifact);
        assert!(!path.exists());

        // never written: dropping is still fine
        drop(store.artifact("download"));
    }
}
