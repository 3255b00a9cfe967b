use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Prefix of the server's own transient files; never offered to clients.
const TRANSIENT_PREFIX: &str = ".tern-";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Check that `name` addresses a single entry in the flat store.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name.contains(['/', '\\', '\0'])
        || name.contains("..")
        || name.starts_with(TRANSIENT_PREFIX);
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Manages the server's flat file directory.
///
/// Each file is stored at `{storage_dir}/{name}`. Uploads land in a staging
/// file first and are renamed into place once the transfer succeeds.
#[derive(Debug)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir)?;
        info!("File storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the file for a given name.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Names of the regular files on disk, sorted.
    ///
    /// Transient files are removed, so call this only at startup before any
    /// transfer is running.
    pub fn scan(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            if name.starts_with(TRANSIENT_PREFIX) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Could not remove stale {}: {}", name, e);
                }
                continue;
            }
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn open(&self, name: &str) -> Result<File, StorageError> {
        Ok(File::open(self.file_path(name)?)?)
    }

    /// Start an upload of `name` into a staging file.
    pub fn stage(&self, name: &str) -> Result<StagedFile, StorageError> {
        let dest = self.file_path(name)?;
        let staging = self.transient_path("upload");
        let file = File::create(&staging)?;
        Ok(StagedFile {
            writer: BufWriter::new(file),
            staging,
            dest,
            committed: false,
        })
    }

    /// Write `contents` to a transient file that is removed when dropped.
    pub fn write_transient(&self, kind: &str, contents: &[u8]) -> Result<TransientFile, StorageError> {
        let path = self.transient_path(kind);
        fs::write(&path, contents)?;
        Ok(TransientFile { path })
    }

    /// Delete a file from disk.
    pub fn delete_file(&self, name: &str) -> Result<(), StorageError> {
        let path = self.file_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted {}", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("File {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn transient_path(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{}{}-{}", TRANSIENT_PREFIX, kind, Uuid::new_v4()))
    }
}

/// An upload being written. Removed on drop unless committed.
#[derive(Debug)]
pub struct StagedFile {
    writer: BufWriter<File>,
    staging: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Flush and move the upload to its final name.
    pub fn commit(mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.staging, &self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.staging);
        }
    }
}

/// A server-generated file that lives only as long as this handle.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_confined_to_the_store() {
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "nul\0", ".tern-upload-x"] {
            assert!(validate_name(bad).is_err(), "{:?} accepted", bad);
        }
        for good in ["notes.txt", "a b c", ".hidden", "ls.txt"] {
            assert!(validate_name(good).is_ok(), "{:?} rejected", good);
        }
    }

    #[test]
    fn staged_upload_appears_only_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();

        let mut staged = storage.stage("up.bin").unwrap();
        staged.write_all(b"payload").unwrap();
        assert!(!dir.path().join("up.bin").exists());
        staged.commit().unwrap();

        assert_eq!(storage.scan().unwrap(), vec!["up.bin".to_string()]);
        assert_eq!(fs::read(dir.path().join("up.bin")).unwrap(), b"payload");
    }

    #[test]
    fn abandoned_upload_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();

        let mut staged = storage.stage("gone.bin").unwrap();
        staged.write_all(b"partial").unwrap();
        drop(staged);

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn scan_skips_and_clears_transient_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();
        fs::write(dir.path().join(".tern-upload-stale"), b"y").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.scan().unwrap(), vec!["keep.txt".to_string()]);
        assert!(!dir.path().join(".tern-upload-stale").exists());
    }

    #[test]
    fn transient_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        let listing = storage.write_transient("list", b"a\n").unwrap();
        let path = listing.path().to_path_buf();
        assert_eq!(fs::read(&path).unwrap(), b"a\n");
        drop(listing);
        assert!(!path.exists());
    }

    #[test]
    fn delete_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        storage.delete_file("never-there").unwrap();
        assert!(storage.delete_file("../x").is_err());
    }
}
