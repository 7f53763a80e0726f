//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store holding one log or snapshot file.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `sync` makes all appended bytes durable
/// - `close` is idempotent; every other call after it fails with
///   [`crate::StorageError::Closed`]
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends beyond the current size or an
    /// I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs. A failed append may leave a
    /// partial write behind; readers treat such a tail as end-of-log.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to `new_size` bytes.
    ///
    /// Used by recovery tooling to cut a file at an arbitrary offset.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or
    /// the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Releases the underlying handle.
    ///
    /// # Errors
    ///
    /// Returns an error if a final flush of the handle fails.
    fn close(&mut self) -> StorageResult<()>;
}
