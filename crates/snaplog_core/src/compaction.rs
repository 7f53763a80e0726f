//! Snapshot compaction.
//!
//! Compaction folds the newest snapshot and the segments written after it
//! into one new snapshot holding the smallest set of operations that
//! rebuilds the same state.
//!
//! ## Algorithm
//!
//! Operations are replayed in order through three independent compressors:
//!
//! - **flat**: key → last put. A delete drops the key, a clear without a
//!   key empties the namespace.
//! - **tree**: key → subkey → last put. A delete with a subkey drops one
//!   entry; a delete with only a key, or a clear with a key, drops the
//!   whole subtree.
//! - **configuration**: the latest global configuration and, separately,
//!   the latest configuration per entry name.
//!
//! The survivors are written as: global configuration, entry
//! configurations, flat puts, tree puts. Inside each group operations keep
//! the order of their last write.
//!
//! ## Crash Safety
//!
//! 1. Survivors are written to `<ts>.unfinished` and fsynced
//! 2. The file is renamed to `<ts>.snap` and the directory fsynced
//! 3. Every file stamped before `<ts>` is deleted
//!
//! Replay never reads unfinished files and always starts at the newest
//! snapshot, so a crash between any two steps leaves a replayable
//! directory. The unfinished stamp is allocated before the writer opens
//! its next segment, which keeps that segment out of the deletion in
//! step 3.

use crate::dir::{LogDir, Manifest};
use crate::error::CoreResult;
use crate::log::{LogFileName, LogKind};
use crate::replay::replay;
use parking_lot::{Condvar, Mutex};
use snaplog_codec::{Op, OpKind};
use std::collections::HashMap;

/// Outcome of one compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Files folded (previous snapshot plus segments).
    pub inputs: usize,
    /// Operations read from the inputs.
    pub ops_in: u64,
    /// Operations written to the new snapshot.
    pub ops_out: u64,
    /// The promoted snapshot.
    pub snapshot: LogFileName,
    /// Superseded files deleted afterwards.
    pub removed: usize,
}

impl CompactionResult {
    /// Fraction of operations dropped.
    #[must_use]
    pub fn reduction_ratio(&self) -> f64 {
        if self.ops_in == 0 {
            return 0.0;
        }
        1.0 - (self.ops_out as f64 / self.ops_in as f64)
    }
}

type Slot = (u64, Op);

/// Folds a stream of operations into its last-write-wins survivors.
///
/// ```rust
/// use snaplog_core::Compactor;
/// use snaplog_codec::Op;
///
/// let mut compactor = Compactor::new();
/// compactor.apply(Op::put("a", "1"));
/// compactor.apply(Op::put("b", "2"));
/// compactor.apply(Op::delete("a"));
/// assert_eq!(compactor.finish(), vec![Op::put("b", "2")]);
/// ```
#[derive(Debug, Default)]
pub struct Compactor {
    seq: u64,
    flat: HashMap<Vec<u8>, Slot>,
    tree: HashMap<Vec<u8>, HashMap<Vec<u8>, Slot>>,
    latest_config: Option<Slot>,
    config_entries: HashMap<Vec<u8>, Slot>,
}

impl Compactor {
    /// Creates an empty compactor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the next operation.
    pub fn apply(&mut self, op: Op) {
        self.seq += 1;
        let seq = self.seq;
        match &op.kind {
            OpKind::Put {
                key,
                subkey: None,
                ..
            } => {
                self.flat.insert(key.clone(), (seq, op));
            }
            OpKind::Put {
                key,
                subkey: Some(subkey),
                ..
            } => {
                let (key, subkey) = (key.clone(), subkey.clone());
                self.tree.entry(key).or_default().insert(subkey, (seq, op));
            }
            OpKind::Delete { key, subkey: None } => {
                self.flat.remove(key);
                self.tree.remove(key);
            }
            OpKind::Delete {
                key,
                subkey: Some(subkey),
            } => {
                if let Some(inner) = self.tree.get_mut(key) {
                    inner.remove(subkey);
                    if inner.is_empty() {
                        self.tree.remove(key);
                    }
                }
            }
            OpKind::Clear { key: None } => self.flat.clear(),
            OpKind::Clear { key: Some(key) } => {
                self.tree.remove(key);
            }
            OpKind::ConfigGlobal { .. } => self.latest_config = Some((seq, op)),
            OpKind::ConfigEntry { key, .. } => {
                self.config_entries.insert(key.clone(), (seq, op));
            }
        }
    }

    /// Number of operations applied.
    #[must_use]
    pub fn applied(&self) -> u64 {
        self.seq
    }

    /// Returns the survivors in output order.
    #[must_use]
    pub fn finish(self) -> Vec<Op> {
        let mut out: Vec<Op> = self.latest_config.into_iter().map(|(_, op)| op).collect();
        out.extend(by_last_write(self.config_entries.into_values()));
        out.extend(by_last_write(self.flat.into_values()));
        out.extend(by_last_write(
            self.tree.into_values().flat_map(HashMap::into_values),
        ));
        out
    }
}

fn by_last_write(slots: impl Iterator<Item = Slot>) -> impl Iterator<Item = Op> {
    let mut slots: Vec<Slot> = slots.collect();
    slots.sort_unstable_by_key(|(seq, _)| *seq);
    slots.into_iter().map(|(_, op)| op)
}

/// Compacts `manifest` into a snapshot written under `target`, an
/// unfinished name stamped after every input.
///
/// On failure the unfinished file is removed and the inputs are left as
/// they were.
///
/// # Errors
///
/// Returns an error if an input cannot be replayed or the snapshot cannot
/// be written, promoted or made durable.
pub fn compact_manifest(
    dir: &LogDir,
    manifest: &Manifest,
    target: LogFileName,
) -> CoreResult<CompactionResult> {
    debug_assert_eq!(target.kind, LogKind::Unfinished);
    tracing::info!(
        inputs = manifest.len(),
        unfinished = %target,
        "compaction started"
    );

    let result = write_snapshot(dir, manifest, target);
    if result.is_err() {
        if let Err(e) = dir.remove(target) {
            tracing::warn!(file = %target, error = %e, "failed removing unfinished snapshot");
        }
    }
    let (ops_in, ops_out) = result?;

    let snapshot = dir.promote(target)?;
    let removed = dir.remove_older_than(snapshot.timestamp)?;

    let result = CompactionResult {
        inputs: manifest.len(),
        ops_in,
        ops_out,
        snapshot,
        removed,
    };
    tracing::info!(
        inputs = result.inputs,
        ops_in,
        ops_out,
        removed,
        snapshot = %snapshot,
        "compaction finished"
    );
    Ok(result)
}

fn write_snapshot(
    dir: &LogDir,
    manifest: &Manifest,
    target: LogFileName,
) -> CoreResult<(u64, u64)> {
    let mut compactor = Compactor::new();
    replay(dir, manifest, |op| compactor.apply(op))?;
    let ops_in = compactor.applied();

    let mut writer = dir.create_file(target, false)?;
    let mut ops_out = 0;
    for op in compactor.finish() {
        writer.append(&op)?;
        ops_out += 1;
    }
    writer.close()?;
    Ok((ops_in, ops_out))
}

/// Compacts everything currently in `dir` into a single snapshot.
///
/// For directories no logger is recording into. Returns `None` when there
/// is nothing to compact.
///
/// # Errors
///
/// See [`compact_manifest`].
pub fn compact(dir: &LogDir) -> CoreResult<Option<CompactionResult>> {
    let manifest = dir.manifest()?;
    if manifest.is_empty() {
        return Ok(None);
    }
    let target = dir.next_name(LogKind::Unfinished);
    compact_manifest(dir, &manifest, target).map(Some)
}

#[derive(Debug, Default)]
struct TrackerState {
    in_flight: usize,
    completed: u64,
    failed: u64,
}

/// Counts background compactions and lets `stop` wait for them.
#[derive(Debug, Default)]
pub(crate) struct CompactionTracker {
    state: Mutex<TrackerState>,
    idle: Condvar,
}

impl CompactionTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    pub(crate) fn begin(&self) {
        self.state.lock().in_flight += 1;
    }

    pub(crate) fn finish(&self, ok: bool) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        if ok {
            state.completed += 1;
        } else {
            state.failed += 1;
        }
        self.idle.notify_all();
    }

    /// Blocks until no compaction is running.
    pub(crate) fn wait_idle(&self) {
        let mut state = self.state.lock();
        while state.in_flight > 0 {
            self.idle.wait(&mut state);
        }
    }

    /// (completed, failed)
    pub(crate) fn counts(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.completed, state.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::log::LogWriter;
    use snaplog_codec::Configuration;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn conf(v: &str) -> Configuration {
        [("v".to_string(), v.to_string())].into_iter().collect()
    }

    fn fold(ops: Vec<Op>) -> Vec<Op> {
        let mut compactor = Compactor::new();
        for op in ops {
            compactor.apply(op);
        }
        compactor.finish()
    }

    #[test]
    fn put_then_delete_collapses() {
        assert!(fold(vec![Op::put("a", "1"), Op::delete("a")]).is_empty());
    }

    #[test]
    fn last_put_wins() {
        let out = fold(vec![
            Op::put("a", "1").with_timestamp(1),
            Op::put("a", "2").with_timestamp(2),
        ]);
        assert_eq!(out, vec![Op::put("a", "2").with_timestamp(2)]);
    }

    #[test]
    fn flat_clear_spares_tree() {
        let out = fold(vec![
            Op::put("a", "1"),
            Op::put_sub("t", "x", "1"),
            Op::clear_all(),
            Op::put("b", "2"),
        ]);
        assert_eq!(out, vec![Op::put("b", "2"), Op::put_sub("t", "x", "1")]);
    }

    #[test]
    fn keyed_clear_drops_subtree_only() {
        let out = fold(vec![
            Op::put("t", "flat"),
            Op::put_sub("t", "x", "1"),
            Op::put_sub("u", "y", "2"),
            Op::clear_key("t"),
        ]);
        assert_eq!(out, vec![Op::put("t", "flat"), Op::put_sub("u", "y", "2")]);
    }

    #[test]
    fn key_delete_drops_flat_and_subtree() {
        let out = fold(vec![
            Op::put("t", "flat"),
            Op::put_sub("t", "x", "1"),
            Op::put_sub("t", "y", "2"),
            Op::delete("t"),
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn subkey_delete_drops_one_entry() {
        let out = fold(vec![
            Op::put_sub("t", "x", "1"),
            Op::put_sub("t", "y", "2"),
            Op::delete_sub("t", "x"),
            Op::delete_sub("missing", "x"),
        ]);
        assert_eq!(out, vec![Op::put_sub("t", "y", "2")]);
    }

    #[test]
    fn config_layers_coexist() {
        let out = fold(vec![
            Op::config_entry("peer", conf("1")),
            Op::config(conf("old")),
            Op::put("k", "v"),
            Op::config(conf("new")),
            Op::config_entry("peer", conf("2")),
            Op::config_entry("other", conf("3")),
        ]);
        assert_eq!(
            out,
            vec![
                Op::config(conf("new")),
                Op::config_entry("peer", conf("2")),
                Op::config_entry("other", conf("3")),
                Op::put("k", "v"),
            ]
        );
    }

    #[test]
    fn survivors_keep_last_write_order() {
        let out = fold(vec![
            Op::put("c", "1"),
            Op::put("a", "1"),
            Op::put("b", "1"),
            Op::put("c", "2"),
        ]);
        let keys: Vec<_> = out.iter().map(|op| op.key().unwrap().to_vec()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn compact_directory() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        for ops in [
            vec![Op::put("a", "1"), Op::put("b", "1")],
            vec![Op::delete("a"), Op::put("b", "2")],
        ] {
            let mut writer =
                LogWriter::create(dir.path(), dir.next_name(LogKind::Log), false).unwrap();
            for op in &ops {
                writer.append(op).unwrap();
            }
            writer.close().unwrap();
        }

        let syncs = || dir.syncs.load(std::sync::atomic::Ordering::Relaxed);
        let before = syncs();
        let result = compact(&dir).unwrap().unwrap();
        // create, promote, garbage collection
        assert_eq!(syncs() - before, 3);
        assert_eq!(result.inputs, 2);
        assert_eq!(result.ops_in, 4);
        assert_eq!(result.ops_out, 1);
        assert_eq!(result.removed, 2);
        assert!(result.reduction_ratio() > 0.7);
        assert_eq!(dir.scan().unwrap(), vec![result.snapshot]);

        let mut seen = Vec::new();
        replay(&dir, &dir.manifest().unwrap(), |op| seen.push(op)).unwrap();
        assert_eq!(seen, vec![Op::put("b", "2")]);
    }

    #[test]
    fn compact_empty_directory_is_noop() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        assert!(compact(&dir).unwrap().is_none());
        assert!(dir.scan().unwrap().is_empty());
    }

    #[test]
    fn failed_compaction_leaves_inputs() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        let name = dir.next_name(LogKind::Log);
        let mut writer = LogWriter::create(dir.path(), name, false).unwrap();
        writer.append(&Op::put("a", "1")).unwrap();
        writer.append(&Op::put("b", "2")).unwrap();
        writer.close().unwrap();

        let path = dir.file_path(name);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[crate::log::HEADER_SIZE] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(compact(&dir).unwrap_err().is_corruption());
        assert_eq!(dir.scan().unwrap(), vec![name]);
    }

    #[test]
    fn compaction_removes_stale_unfinished() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        let stale = dir.next_name(LogKind::Unfinished);
        std::fs::write(dir.file_path(stale), b"partial").unwrap();
        let mut writer = LogWriter::create(dir.path(), dir.next_name(LogKind::Log), false).unwrap();
        writer.append(&Op::put("a", "1")).unwrap();
        writer.close().unwrap();

        let result = compact(&dir).unwrap().unwrap();
        assert_eq!(dir.scan().unwrap(), vec![result.snapshot]);
    }

    #[test]
    fn tracker_waits_for_finish() {
        let tracker = Arc::new(CompactionTracker::new());
        tracker.begin();
        assert_eq!(tracker.in_flight(), 1);

        let worker = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                tracker.finish(true);
            })
        };
        tracker.wait_idle();
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.counts(), (1, 0));
        worker.join().unwrap();
    }

    fn arb_op() -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::prelude::*;
        let key = prop::sample::select(vec!["a", "b", "c"]);
        prop_oneof![
            (key.clone(), any::<u8>()).prop_map(|(k, v)| Op::put(k, vec![v])),
            (key.clone(), key.clone(), any::<u8>()).prop_map(|(k, s, v)| Op::put_sub(k, s, vec![v])),
            key.clone().prop_map(Op::delete),
            (key.clone(), key.clone()).prop_map(|(k, s)| Op::delete_sub(k, s)),
            Just(Op::clear_all()),
            key.clone().prop_map(Op::clear_key),
            "[a-c]".prop_map(|v| Op::config(conf(&v))),
            (key, "[a-c]").prop_map(|(k, v)| Op::config_entry(k, conf(&v))),
        ]
    }

    proptest::proptest! {
        #[test]
        fn folding_is_idempotent(ops in proptest::collection::vec(arb_op(), 0..64)) {
            let once = fold(ops.clone());
            proptest::prop_assert!(once.len() <= ops.len());
            proptest::prop_assert_eq!(fold(once.clone()), once);
        }
    }
}
