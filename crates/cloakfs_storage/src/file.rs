//! File-backed store for persistent ciphertext.

use crate::error::StorageResult;
use crate::store::BackingStore;

use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backing store over an OS file.
///
/// # Durability
///
/// - `sync(true)` calls `File::sync_data()`
/// - `sync(false)` calls `File::sync_all()`, which also flushes
///   metadata
///
/// # Thread safety
///
/// Positioned access goes through a seek, so the handle is guarded by a
/// lock; callers above add their own serialization per encrypted file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: RwLock<File>,
}

impl FileStore {
    /// Opens or creates a file store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
        })
    }

    /// Opens or creates a file store, creating parent directories if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for FileStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut file = self.file.write();
        let size = file.metadata()?.len();
        if offset >= size {
            return Ok(0);
        }

        let available = usize::try_from(size - offset).unwrap_or(usize::MAX);
        let want = buf.len().min(available);

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..want])?;
        Ok(want)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        // Seeking past the end is fine; the OS zero-fills the gap.
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn truncate(&self, size: u64) -> StorageResult<()> {
        let file = self.file.write();
        file.set_len(size)?;
        Ok(())
    }

    fn sync(&self, data_only: bool) -> StorageResult<()> {
        let file = self.file.write();
        if data_only {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.file.read().metadata()?.len())
    }
}
