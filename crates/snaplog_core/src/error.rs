//! Error types for snaplog core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in snaplog core operations.
///
/// Calling an operation in the wrong logger state is a programming error
/// and panics instead of returning one of these.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] snaplog_storage::StorageError),

    /// Operation codec error outside of replay (e.g. while encoding).
    #[error("codec error: {0}")]
    Codec(#[from] snaplog_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A complete record that cannot be decoded.
    #[error("corrupt record in {} at offset {offset}: {message}", file.display())]
    CorruptRecord {
        /// File holding the record.
        file: PathBuf,
        /// Offset of the record start.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch on a complete record.
    #[error(
        "checksum mismatch in {} at offset {offset}: expected {expected:08x}, got {actual:08x}",
        file.display()
    )]
    ChecksumMismatch {
        /// File holding the record.
        file: PathBuf,
        /// Offset of the record start.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Another logger holds the directory lock.
    #[error("log directory locked: {}", path.display())]
    DirectoryLocked {
        /// The locked directory.
        path: PathBuf,
    },

    /// The log directory is missing or not a directory.
    #[error("invalid log directory: {message}")]
    InvalidDirectory {
        /// Description of the problem.
        message: String,
    },

    /// The writer or compaction thread panicked or could not be spawned.
    #[error("writer failed: {message}")]
    WriterFailed {
        /// Description of the failure.
        message: String,
    },

    /// The writer thread is gone; its error is reported by `stop`.
    #[error("writer closed")]
    WriterClosed,
}

impl CoreError {
    /// Creates a corrupt record error.
    pub fn corrupt_record(file: impl Into<PathBuf>, offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            file: file.into(),
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid directory error.
    pub fn invalid_directory(message: impl Into<String>) -> Self {
        Self::InvalidDirectory {
            message: message.into(),
        }
    }

    /// Creates a writer failed error.
    pub fn writer_failed(message: impl Into<String>) -> Self {
        Self::WriterFailed {
            message: message.into(),
        }
    }

    /// Returns true for errors that mean a log file holds a damaged record.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptRecord { .. } | Self::ChecksumMismatch { .. }
        )
    }
}
