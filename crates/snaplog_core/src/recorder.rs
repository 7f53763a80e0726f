//! The writer thread.
//!
//! One thread owns the active segment. Appends reach it through a
//! rendezvous channel, so `dump` returns only once the writer has taken
//! the operation and a slow disk throttles callers instead of queueing.

use crate::compaction::{compact_manifest, CompactionTracker};
use crate::dir::LogDir;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogKind, LogWriter};
use snaplog_codec::Op;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) enum WriterCommand {
    Append(Op),
    Stop,
}

/// Caller side of a running writer thread.
pub(crate) struct WriterHandle {
    pub(crate) sender: SyncSender<WriterCommand>,
    pub(crate) join: JoinHandle<CoreResult<()>>,
}

pub(crate) struct Recorder {
    pub(crate) dir: Arc<LogDir>,
    pub(crate) current: LogWriter,
    pub(crate) max_size: u64,
    pub(crate) sync_on_append: bool,
    pub(crate) compactions: Arc<CompactionTracker>,
    pub(crate) rotations: Arc<AtomicU64>,
}

impl Recorder {
    /// Starts the writer thread.
    pub(crate) fn spawn(self) -> CoreResult<WriterHandle> {
        let (sender, receiver) = mpsc::sync_channel(0);
        let join = thread::Builder::new()
            .name("snaplog-writer".into())
            .spawn(move || self.run(&receiver))
            .map_err(|e| CoreError::writer_failed(format!("spawning writer thread: {e}")))?;
        Ok(WriterHandle { sender, join })
    }

    fn run(mut self, receiver: &Receiver<WriterCommand>) -> CoreResult<()> {
        tracing::debug!(file = %self.current.name(), max_size = self.max_size, "writer started");
        loop {
            if self.max_size > 0 {
                if let Err(e) = self.maybe_rotate() {
                    tracing::error!(file = %self.current.name(), error = %e, "log rotation failed");
                    return Err(e);
                }
            }
            match receiver.recv() {
                Ok(WriterCommand::Append(op)) => {
                    if let Err(e) = self.current.append(&op) {
                        tracing::error!(file = %self.current.name(), error = %e, "append failed");
                        return Err(e);
                    }
                }
                Ok(WriterCommand::Stop) | Err(_) => break,
            }
        }
        self.current.close()?;
        tracing::debug!(
            file = %self.current.name(),
            ops = self.current.ops_written(),
            "writer stopped"
        );
        Ok(())
    }

    /// Closes the active segment and hands it to a background compaction
    /// once it outgrows `max_size`. Skipped while a compaction runs.
    fn maybe_rotate(&mut self) -> CoreResult<()> {
        let size = self.current.size()?;
        if size <= self.max_size || self.compactions.in_flight() > 0 {
            return Ok(());
        }

        self.current.close()?;
        let manifest = self.dir.manifest()?;
        let target = self.dir.next_name(LogKind::Unfinished);
        let next = self
            .dir
            .create_file(self.dir.next_name(LogKind::Log), self.sync_on_append)?;
        let old = std::mem::replace(&mut self.current, next);
        self.rotations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(old = %old.name(), new = %self.current.name(), size, "rotated log");

        self.compactions.begin();
        let dir = Arc::clone(&self.dir);
        let tracker = Arc::clone(&self.compactions);
        let spawned = thread::Builder::new()
            .name("snaplog-compaction".into())
            .spawn(move || {
                let ok = match compact_manifest(&dir, &manifest, target) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(unfinished = %target, error = %e, "compaction failed");
                        false
                    }
                };
                // Release the directory lock before waking `stop`.
                drop(dir);
                tracker.finish(ok);
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed spawning compaction thread");
            self.compactions.finish(false);
        }
        Ok(())
    }
}
