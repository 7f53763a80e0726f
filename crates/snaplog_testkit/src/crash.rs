//! Crash simulation for log files.
//!
//! Two ways a crash shows up on disk are covered:
//!
//! 1. **Torn append**: the process dies inside `append`, leaving part of a
//!    record. [`CrashableBackend`] stops writing after a byte budget.
//! 2. **Lost tail**: the OS never flushed the end of the file. Any prefix
//!    of a log file is a possible post-crash state; [`check_truncation_prefixes`]
//!    replays every one of them.
//!
//! In both cases replay must yield a prefix of what was appended.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snaplog_testkit::crash::check_truncation_prefixes;
//!
//! check_truncation_prefixes(&[Op::put("a", "1"), Op::delete("a")]).unwrap();
//! ```

use parking_lot::Mutex;
use snaplog_core::{encode_record, CoreResult, LogReader, Op};
use snaplog_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An in-memory backend that fails once a byte budget is used up.
///
/// The write that crosses the budget is cut short, like an append torn by
/// a crash. The bytes that "reached disk" stay readable through a
/// [`CrashHandle`] after the backend itself has been dropped.
pub struct CrashableBackend {
    data: Arc<Mutex<Vec<u8>>>,
    crash_after: Option<usize>,
    fail_sync: bool,
    crashed: bool,
    closed: bool,
}

/// Read access to what a [`CrashableBackend`] wrote.
#[derive(Clone)]
pub struct CrashHandle {
    data: Arc<Mutex<Vec<u8>>>,
}

impl CrashHandle {
    /// The bytes written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl CrashableBackend {
    /// Creates a backend that never crashes until told to.
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Vec::new())),
            crash_after: None,
            fail_sync: false,
            crashed: false,
            closed: false,
        }
    }

    /// Crashes once `bytes` bytes have been written in total.
    pub fn crash_after(mut self, bytes: usize) -> Self {
        self.crash_after = Some(bytes);
        self
    }

    /// Makes every `sync` fail.
    pub fn fail_sync(mut self) -> Self {
        self.fail_sync = true;
        self
    }

    /// A handle for inspecting the written bytes later.
    pub fn handle(&self) -> CrashHandle {
        CrashHandle {
            data: Arc::clone(&self.data),
        }
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed
    }

    fn simulated(message: &str) -> StorageError {
        StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
    }

    fn check_usable(&self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if self.crashed {
            return Err(Self::simulated("backend crashed"));
        }
        Ok(())
    }
}

impl Default for CrashableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.lock();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.check_usable()?;
        let mut data = self.data.lock();
        let offset = data.len();

        if let Some(budget) = self.crash_after {
            if offset + bytes.len() > budget {
                let partial = budget.saturating_sub(offset);
                data.extend_from_slice(&bytes[..partial]);
                self.crashed = true;
                return Err(Self::simulated("simulated crash during append"));
            }
        }

        data.extend_from_slice(bytes);
        Ok(offset as u64)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_usable()?;
        if self.fail_sync {
            self.crashed = true;
            return Err(Self::simulated("simulated crash during sync"));
        }
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_usable()?;
        let mut data = self.data.lock();
        if new_size > data.len() as u64 {
            return Err(Self::simulated("cannot grow by truncation"));
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Encodes `ops` as the bytes of one log file.
pub fn encode_log(ops: &[Op]) -> Vec<u8> {
    ops.iter()
        .flat_map(|op| encode_record(op).expect("Failed to encode record"))
        .collect()
}

/// Replays raw log-file bytes. Returns the operations and whether the
/// reader stopped at an incomplete tail.
pub fn replay_bytes(bytes: &[u8]) -> CoreResult<(Vec<Op>, bool)> {
    let mut reader = LogReader::from_backend(
        PathBuf::from("memory.log"),
        Box::new(InMemoryBackend::with_data(bytes.to_vec())),
    )?;
    let mut ops = Vec::new();
    while let Some(op) = reader.read_next()? {
        ops.push(op);
    }
    Ok((ops, reader.truncated_tail()))
}

/// Cuts the file at `path` to `len` bytes, as if the rest never reached
/// the disk.
pub fn truncate_file(path: &Path, len: u64) -> CoreResult<()> {
    let mut backend = FileBackend::open(path)?;
    backend.truncate(len)?;
    backend.close()?;
    Ok(())
}

/// Replays every prefix of the log holding `ops` and checks that each one
/// yields a prefix of `ops`, and that only a cut on a record boundary is
/// reported as a clean end.
///
/// # Errors
///
/// Returns a description of the first cut that violates this.
pub fn check_truncation_prefixes(ops: &[Op]) -> Result<(), String> {
    let bytes = encode_log(ops);
    let mut boundaries = vec![0usize];
    for op in ops {
        let last = *boundaries.last().unwrap_or(&0);
        boundaries.push(last + encode_record(op).map_err(|e| e.to_string())?.len());
    }

    for cut in 0..=bytes.len() {
        let (read, torn) =
            replay_bytes(&bytes[..cut]).map_err(|e| format!("cut at {cut}: {e}"))?;
        let complete = boundaries.iter().filter(|&&b| b <= cut).count() - 1;
        if read.as_slice() != &ops[..complete] {
            return Err(format!(
                "cut at {cut}: read {} ops, expected the first {complete}",
                read.len()
            ));
        }
        let on_boundary = boundaries.contains(&cut);
        if torn == on_boundary {
            return Err(format!("cut at {cut}: torn tail flag is {torn}"));
        }
    }
    Ok(())
}
