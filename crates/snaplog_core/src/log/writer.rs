//! Sequential append of framed records.

use crate::error::CoreResult;
use crate::log::name::LogFileName;
use crate::log::record::encode_record;
use snaplog_codec::Op;
use snaplog_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};

/// Append-only writer for one log or snapshot file.
///
/// Append failures are returned to the caller unmodified; the writer loop
/// treats any of them as fatal.
pub struct LogWriter {
    name: LogFileName,
    path: PathBuf,
    backend: Box<dyn StorageBackend>,
    sync_on_append: bool,
    ops_written: u64,
    closed: bool,
}

impl LogWriter {
    /// Creates `name` inside `dir`. The file must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(dir: &Path, name: LogFileName, sync_on_append: bool) -> CoreResult<Self> {
        let path = name.path_in(dir);
        let backend = FileBackend::create(&path)?;
        Ok(Self::with_backend(name, path, Box::new(backend), sync_on_append))
    }

    /// Wraps an already open backend.
    #[must_use]
    pub fn with_backend(
        name: LogFileName,
        path: PathBuf,
        backend: Box<dyn StorageBackend>,
        sync_on_append: bool,
    ) -> Self {
        Self {
            name,
            path,
            backend,
            sync_on_append,
            ops_written: 0,
            closed: false,
        }
    }

    /// Appends one operation and returns the offset of its record.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn append(&mut self, op: &Op) -> CoreResult<u64> {
        let record = encode_record(op)?;
        let offset = self.backend.append(&record)?;
        if self.sync_on_append {
            self.backend.sync()?;
        }
        self.ops_written += 1;
        Ok(offset)
    }

    /// Current file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer is closed.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Syncs appended records to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }

    /// Syncs and releases the file handle. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.backend.sync()?;
        self.backend.close()?;
        Ok(())
    }

    /// Name of the file being written.
    #[must_use]
    pub fn name(&self) -> LogFileName {
        self.name
    }

    /// Path of the file being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of operations appended so far.
    #[must_use]
    pub fn ops_written(&self) -> u64 {
        self.ops_written
    }

    /// Returns true after [`LogWriter::close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                tracing::warn!(file = %self.path.display(), error = %e, "failed closing log file");
            }
        }
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("name", &self.name)
            .field("ops_written", &self.ops_written)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
