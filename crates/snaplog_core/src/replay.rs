//! Replay of a snapshot and the segments after it.

use crate::dir::{LogDir, Manifest};
use crate::error::CoreResult;
use crate::log::LogReader;
use snaplog_codec::Op;

/// Summary of one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Files read.
    pub files: usize,
    /// Operations delivered to the callback.
    pub ops: u64,
    /// Files that ended in an incomplete record.
    pub truncated_tails: usize,
}

/// Feeds every operation of `manifest` to `operate`: the snapshot first,
/// then each segment in timestamp order, each file front to back.
///
/// # Errors
///
/// Stops at the first unreadable file or damaged record. Operations read
/// before the error have already been delivered.
pub fn replay<F>(dir: &LogDir, manifest: &Manifest, mut operate: F) -> CoreResult<ReplayStats>
where
    F: FnMut(Op),
{
    let mut stats = ReplayStats::default();
    for name in manifest.files() {
        let mut reader = LogReader::open(&dir.file_path(name))?;
        while let Some(op) = reader.read_next()? {
            operate(op);
            stats.ops += 1;
        }
        stats.files += 1;
        if reader.truncated_tail() {
            stats.truncated_tails += 1;
        }
        reader.close()?;
    }

    tracing::debug!(
        files = stats.files,
        ops = stats.ops,
        truncated = stats.truncated_tails,
        "replay finished"
    );
    Ok(stats)
}
