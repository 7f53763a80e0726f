//! The logger handle and its state machine.

use crate::compaction::CompactionTracker;
use crate::config::Config;
use crate::dir::LogDir;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogFileName, LogKind, LogWriter};
use crate::recorder::{Recorder, WriterCommand, WriterHandle};
use crate::replay::{replay, ReplayStats};
use parking_lot::Mutex;
use snaplog_codec::Op;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// What a [`Logger`] is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoggerState {
    /// Idle; `record`, `play`, `limit` and `clear` are allowed.
    Stopped = 0,
    /// A writer thread accepts `dump`.
    Recording = 1,
    /// `play` is running.
    Playing = 2,
}

impl LoggerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Recording,
            2 => Self::Playing,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LoggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Recording => "recording",
            Self::Playing => "playing",
        })
    }
}

/// Counters since the logger was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    /// Segments closed because they outgrew the size limit.
    pub rotations: u64,
    /// Background compactions that promoted a snapshot.
    pub compactions: u64,
    /// Background compactions that failed and left their inputs.
    pub failed_compactions: u64,
}

/// A crash-recoverable operation log bound to one directory.
///
/// A logger is either stopped, recording or playing. Calling an operation
/// in a state that does not allow it is a programming error and panics.
///
/// While recording, operations passed to [`Logger::dump`] are appended by a
/// dedicated writer thread. When a size limit is set and the active segment
/// outgrows it, the writer starts a fresh segment and folds everything
/// before it into a snapshot in the background.
///
/// # Example
///
/// ```rust
/// use snaplog_core::{Logger, Op};
///
/// let dir = tempfile::tempdir().unwrap();
/// let logger = Logger::new(dir.path()).unwrap();
///
/// logger.record().unwrap();
/// logger.dump(Op::put("a", "1")).unwrap();
/// logger.dump(Op::delete("a")).unwrap();
/// logger.stop().unwrap();
///
/// let mut ops = Vec::new();
/// logger.play(|op| ops.push(op)).unwrap();
/// assert_eq!(ops, vec![Op::put("a", "1"), Op::delete("a")]);
/// ```
pub struct Logger {
    dir: Arc<LogDir>,
    config: Config,
    max_size: AtomicU64,
    state: AtomicU8,
    writer: Mutex<Option<WriterHandle>>,
    compactions: Arc<CompactionTracker>,
    rotations: Arc<AtomicU64>,
}

impl Logger {
    /// Opens a logger over `path` with the default configuration, creating
    /// the directory if needed.
    ///
    /// # Errors
    ///
    /// See [`Logger::open`].
    pub fn new(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open(path, Config::default())
    }

    /// Opens a logger over `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the directory is missing and `create_if_missing` is off
    /// - another logger holds the directory (`DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let dir = LogDir::open(path.as_ref(), &config)?;
        Ok(Self {
            dir: Arc::new(dir),
            max_size: AtomicU64::new(config.max_log_size),
            config,
            state: AtomicU8::new(LoggerState::Stopped as u8),
            writer: Mutex::new(None),
            compactions: Arc::new(CompactionTracker::new()),
            rotations: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Sets the size in bytes above which the active segment is rotated
    /// and compacted; 0 disables rotation. Takes effect at the next
    /// [`Logger::record`].
    ///
    /// # Panics
    ///
    /// Panics unless the logger is stopped.
    pub fn limit(&self, max_size: u64) -> &Self {
        self.expect_state(LoggerState::Stopped, "limit");
        self.max_size.store(max_size, Ordering::Release);
        self
    }

    /// Starts recording into a new segment and returns its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be created or the writer
    /// thread cannot be started; the logger stays stopped.
    ///
    /// # Panics
    ///
    /// Panics unless the logger is stopped.
    pub fn record(&self) -> CoreResult<LogFileName> {
        let mut slot = self.writer.lock();
        self.transition(LoggerState::Stopped, LoggerState::Recording, "record");

        let name = self.dir.next_name(LogKind::Log);
        let started = LogWriter::create(self.dir.path(), name, self.config.sync_on_append)
            .and_then(|current| {
                self.start_writer(current).map_err(|e| {
                    self.discard_segment(name);
                    e
                })
            });

        match started {
            Ok(handle) => {
                *slot = Some(handle);
                info!(dir = %self.dir.path().display(), file = %name, "recording");
                Ok(name)
            }
            Err(e) => {
                self.state
                    .store(LoggerState::Stopped as u8, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Appends `op`, blocking until the writer thread has taken it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriterClosed`] if the writer thread has exited
    /// after a failure; [`Logger::stop`] reports that failure.
    ///
    /// # Panics
    ///
    /// Panics unless the logger is recording.
    pub fn dump(&self, op: Op) -> CoreResult<()> {
        self.expect_state(LoggerState::Recording, "dump");
        let sender = self
            .writer
            .lock()
            .as_ref()
            .map(|handle| handle.sender.clone())
            .ok_or(CoreError::WriterClosed)?;
        sender
            .send(WriterCommand::Append(op))
            .map_err(|_| CoreError::WriterClosed)
    }

    /// Stops recording: the writer closes its segment, then this call waits
    /// for any background compaction to finish.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the writer thread, if any.
    ///
    /// # Panics
    ///
    /// Panics unless the logger is recording.
    pub fn stop(&self) -> CoreResult<()> {
        let mut slot = self.writer.lock();
        self.transition(LoggerState::Recording, LoggerState::Stopped, "stop");
        let result = match slot.take() {
            Some(handle) => join_writer(handle),
            None => Ok(()),
        };
        drop(slot);

        self.compactions.wait_idle();
        info!(dir = %self.dir.path().display(), "stopped");
        result
    }

    /// Replays the newest snapshot and every segment after it, passing each
    /// operation to `operate` in the order it was recorded.
    ///
    /// The logger is stopped again when this returns, also on error.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or holds a damaged record.
    /// An incomplete final record is not an error.
    ///
    /// # Panics
    ///
    /// Panics unless the logger is stopped.
    pub fn play<F>(&self, operate: F) -> CoreResult<ReplayStats>
    where
        F: FnMut(Op),
    {
        self.transition(LoggerState::Stopped, LoggerState::Playing, "play");
        let _reset = StateReset(&self.state);
        let manifest = self.dir.manifest()?;
        replay(&self.dir, &manifest, operate)
    }

    /// Deletes all history and starts recording into a new segment.
    ///
    /// An active recording is stopped first.
    ///
    /// # Errors
    ///
    /// Returns an error from stopping, deleting or starting the new
    /// recording.
    ///
    /// # Panics
    ///
    /// Panics while the logger is playing.
    pub fn clear(&self) -> CoreResult<LogFileName> {
        match self.state() {
            LoggerState::Recording => self.stop()?,
            LoggerState::Stopped => {}
            LoggerState::Playing => panic!("clear called while logger is playing"),
        }
        let cutoff = self.dir.next_stamp();
        let removed = self.dir.remove_older_than(cutoff)?;
        info!(dir = %self.dir.path().display(), removed, "cleared history");
        self.record()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoggerState {
        LoggerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns true while recording.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state() == LoggerState::Recording
    }

    /// The log directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// The rotation threshold in bytes (0 = none).
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.max_size.load(Ordering::Acquire)
    }

    /// The configuration the logger was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rotation and compaction counters.
    #[must_use]
    pub fn stats(&self) -> LoggerStats {
        let (compactions, failed_compactions) = self.compactions.counts();
        LoggerStats {
            rotations: self.rotations.load(Ordering::Relaxed),
            compactions,
            failed_compactions,
        }
    }

    /// Makes the new segment durable and hands it to a writer thread.
    /// `current` is closed again when this fails.
    fn start_writer(&self, current: LogWriter) -> CoreResult<WriterHandle> {
        self.dir.sync()?;
        Recorder {
            dir: Arc::clone(&self.dir),
            current,
            max_size: self.max_size(),
            sync_on_append: self.config.sync_on_append,
            compactions: Arc::clone(&self.compactions),
            rotations: Arc::clone(&self.rotations),
        }
        .spawn()
    }

    fn discard_segment(&self, name: LogFileName) {
        if let Err(e) = self.dir.remove(name) {
            warn!(file = %name, error = %e, "failed removing unused segment");
        }
    }

    fn expect_state(&self, expected: LoggerState, op: &str) {
        let actual = self.state();
        assert!(
            actual == expected,
            "{op} called while logger is {actual}, expected {expected}"
        );
    }

    fn transition(&self, from: LoggerState, to: LoggerState, op: &str) {
        if let Err(actual) =
            self.state
                .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "{op} called while logger is {}, expected {from}",
                LoggerState::from_u8(actual)
            );
        }
    }
}

fn join_writer(handle: WriterHandle) -> CoreResult<()> {
    let WriterHandle { sender, join } = handle;
    // A failed send means the writer already exited; join reports why.
    let _ = sender.send(WriterCommand::Stop);
    drop(sender);
    join.join()
        .map_err(|_| CoreError::writer_failed("writer thread panicked"))?
}

struct StateReset<'a>(&'a AtomicU8);

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        self.0.store(LoggerState::Stopped as u8, Ordering::Release);
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.is_recording() {
            if let Err(e) = self.stop() {
                warn!(dir = %self.dir.path().display(), error = %e, "stop on drop failed");
            }
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("dir", &self.dir.path())
            .field("state", &self.state())
            .field("max_size", &self.max_size())
            .finish_non_exhaustive()
    }
}
