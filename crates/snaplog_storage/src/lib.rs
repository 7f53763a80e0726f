//! # snaplog storage
//!
//! Byte-level storage backends underneath snaplog's log and snapshot files.
//!
//! Backends are **opaque byte stores**: they know nothing about records,
//! checksums or file naming. The core crate owns every format decision and
//! only asks a backend to append, read back, report its size, sync and
//! release its handle.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - one OS file per log or snapshot
//! - [`InMemoryBackend`] - for tests and crash simulation
//!
//! ## Example
//!
//! ```rust
//! use snaplog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"first").unwrap();
//! let second = backend.append(b"second").unwrap();
//! backend.sync().unwrap();
//!
//! assert_eq!(second, 5);
//! assert_eq!(backend.size().unwrap(), 11);
//! assert_eq!(backend.read_at(second, 6).unwrap(), b"second");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
