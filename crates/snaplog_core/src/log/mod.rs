//! Log and snapshot files.
//!
//! Every file in a log directory is a flat sequence of framed [`Op`] records.
//! Active segments (`.log`) are appended to by the writer; snapshots
//! (`.snap`) are written once by compaction, first under an `.unfinished`
//! name that replay never looks at.
//!
//! ## Record Format
//!
//! ```text
//! | magic "SLOG" (4) | version (2) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload is the CBOR encoding of one [`Op`]; the CRC covers header
//! and payload.
//!
//! ## Recovery Policy
//!
//! Tolerated (clean end-of-log):
//!
//! - fewer bytes left than a header or than the declared record
//! - a tail made only of zero bytes
//!
//! Both are what a crash in the middle of an append leaves behind.
//!
//! Fatal (`Play` fails):
//!
//! - bad magic, unsupported version or checksum mismatch on a complete record
//! - a complete record whose payload is not a valid operation
//!
//! [`Op`]: snaplog_codec::Op

mod name;
mod reader;
mod record;
mod writer;

pub use name::{LogFileName, LogKind};
pub use reader::LogReader;
pub use record::{encode_record, CRC_SIZE, HEADER_SIZE, RECORD_MAGIC, RECORD_VERSION};
pub use writer::LogWriter;
