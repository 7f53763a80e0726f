//! # snaplog core
//!
//! A single-writer, crash-recoverable operation log with background
//! snapshot compaction.
//!
//! This crate provides:
//! - Framed, checksummed log files that tolerate a torn final record
//! - A directory scanner that picks the newest snapshot and the segments after it
//! - A writer thread with size-based rotation
//! - Last-write-wins compaction into snapshots, concurrent with writes
//! - Replay of snapshot plus segments in recorded order
//!
//! The [`Logger`] ties these together; the lower layers are public for
//! tooling and tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compaction;
mod config;
mod dir;
mod error;
pub mod log;
mod logger;
mod recorder;
mod replay;

pub use compaction::{compact, compact_manifest, CompactionResult, Compactor};
pub use config::Config;
pub use dir::{LogDir, Manifest};
pub use error::{CoreError, CoreResult};
pub use log::{encode_record, LogFileName, LogKind, LogReader, LogWriter};
pub use logger::{Logger, LoggerState, LoggerStats};
pub use replay::{replay, ReplayStats};

pub use snaplog_codec::{Configuration, Op, OpKind, OpParts};
