//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A storage backend over a single OS file.
///
/// Log segments are created with [`FileBackend::create`] and written once
/// from start to end; replay opens them with [`FileBackend::open_read_only`].
///
/// # Durability
///
/// `append` hands bytes to the OS with `write_all`; `sync` calls
/// `File::sync_all()`.
///
/// # Example
///
/// ```no_run
/// use snaplog_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::create(Path::new("1700000000000000000.log")).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// backend.close().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<Option<File>>,
    size: RwLock<u64>,
    writable: bool,
}

impl FileBackend {
    /// Creates a new, empty file for appending.
    ///
    /// # Errors
    ///
    /// Fails if the file already exists or cannot be created.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self::from_file(path, file, 0, true))
    }

    /// Opens an existing file for reading and writing.
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist or cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self::from_file(path, file, size, true))
    }

    /// Opens an existing file for sequential replay.
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self::from_file(path, file, size, false))
    }

    fn from_file(path: &Path, file: File, size: u64, writable: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            file: RwLock::new(Some(file)),
            size: RwLock::new(size),
            writable,
        }
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once [`StorageBackend::close`] has released the handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly)
        }
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let mut guard = self.file.write();
        let file = guard.as_mut().ok_or(StorageError::Closed)?;

        if len == 0 {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check_writable()?;

        let mut guard = self.file.write();
        let file = guard.as_mut().ok_or(StorageError::Closed)?;
        let mut size = self.size.write();

        let offset = *size;
        if data.is_empty() {
            return Ok(offset);
        }

        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(StorageError::Closed)?;
        if self.writable {
            file.sync_all()?;
        }
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_writable()?;

        let guard = self.file.write();
        let file = guard.as_ref().ok_or(StorageError::Closed)?;
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, *size
                ),
            )));
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(mut file) = self.file.write().take() {
            if self.writable {
                file.flush()?;
            }
        }
        Ok(())
    }
}
