//! Log directory management.
//!
//! A log directory holds nothing but timestamp-named files and a lock:
//!
//! ```text
//! <dir>/
//! ├─ LOCK                          # Advisory lock for the single writer
//! ├─ 1700000000000000000.snap      # Current base state
//! ├─ 1700000000100000000.log       # Segments written after the snapshot
//! ├─ 1700000000200000000.log       # Active segment
//! └─ 1700000000150000000.unfinished  # Snapshot being compacted
//! ```
//!
//! Any other name is left alone.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogFileName, LogKind, LogWriter};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const LOCK_FILE: &str = "LOCK";

/// Files to replay, in order: the newest snapshot, then every segment
/// written after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Newest snapshot, if the log was ever compacted.
    pub snapshot: Option<LogFileName>,
    /// Segments newer than `snapshot`, ascending by timestamp.
    pub logs: Vec<LogFileName>,
}

impl Manifest {
    /// Builds a manifest from an unordered listing.
    #[must_use]
    pub fn from_names(names: &[LogFileName]) -> Self {
        let snapshot = names
            .iter()
            .filter(|n| n.kind == LogKind::Snap)
            .max()
            .copied();
        let floor = snapshot.map(|s| s.timestamp);

        let mut logs: Vec<LogFileName> = names
            .iter()
            .filter(|n| n.kind == LogKind::Log)
            .filter(|n| floor.map_or(true, |ts| n.timestamp > ts))
            .copied()
            .collect();
        logs.sort();

        Self { snapshot, logs }
    }

    /// All files in replay order.
    pub fn files(&self) -> impl Iterator<Item = LogFileName> + '_ {
        self.snapshot.iter().chain(self.logs.iter()).copied()
    }

    /// Number of files to replay.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len() + usize::from(self.snapshot.is_some())
    }

    /// True when there is nothing to replay.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An opened log directory.
///
/// Holds the directory lock (unless disabled) and hands out strictly
/// increasing file timestamps.
#[derive(Debug)]
pub struct LogDir {
    path: PathBuf,
    _lock_file: Option<File>,
    last_stamp: Mutex<u64>,
    #[cfg(test)]
    pub(crate) syncs: std::sync::atomic::AtomicUsize,
}

impl LogDir {
    /// Opens or creates a log directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the directory is missing and `create_if_missing` is off
    /// - the path is not a directory
    /// - another logger holds the lock (`DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_directory(format!(
                    "log directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_directory(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = if config.lock_directory {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path.join(LOCK_FILE))?;
            if file.try_lock_exclusive().is_err() {
                return Err(CoreError::DirectoryLocked {
                    path: path.to_path_buf(),
                });
            }
            Some(file)
        } else {
            None
        };

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            last_stamp: Mutex::new(0),
            #[cfg(test)]
            syncs: std::sync::atomic::AtomicUsize::new(0),
        };
        let newest = dir.scan()?.last().map_or(0, |n| n.timestamp);
        *dir.last_stamp.lock() = newest;

        tracing::debug!(dir = %path.display(), newest, "opened log directory");
        Ok(dir)
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of `name` in this directory.
    #[must_use]
    pub fn file_path(&self, name: LogFileName) -> PathBuf {
        name.path_in(&self.path)
    }

    /// Lists every snapshot, segment and unfinished file, sorted by
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn scan(&self) -> CoreResult<Vec<LogFileName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<LogFileName>().ok())
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Scans the directory and returns what replay should read.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn manifest(&self) -> CoreResult<Manifest> {
        Ok(Manifest::from_names(&self.scan()?))
    }

    /// Returns a timestamp greater than every timestamp handed out or found
    /// on disk so far. Follows the wall clock in nanoseconds when it moves
    /// forward.
    pub fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        let mut last = self.last_stamp.lock();
        let stamp = now.max(last.saturating_add(1));
        *last = stamp;
        stamp
    }

    /// Allocates a fresh name of the given kind.
    pub fn next_name(&self, kind: LogKind) -> LogFileName {
        LogFileName::new(self.next_stamp(), kind)
    }

    /// Creates `name` for writing and makes its directory entry durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the file already exists or cannot be created, or
    /// the directory sync fails.
    pub fn create_file(&self, name: LogFileName, sync_on_append: bool) -> CoreResult<LogWriter> {
        let writer = LogWriter::create(&self.path, name, sync_on_append)?;
        self.sync()?;
        Ok(writer)
    }

    /// Deletes every snapshot, segment and unfinished file stamped before
    /// `timestamp`, returning how many were removed.
    ///
    /// A file that cannot be removed is logged and skipped; it will be
    /// retried by the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or synced.
    pub fn remove_older_than(&self, timestamp: u64) -> CoreResult<usize> {
        let mut removed = 0;
        for name in self.scan()?.into_iter().filter(|n| n.timestamp < timestamp) {
            let path = self.file_path(name);
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "failed removing superseded file");
                }
            }
        }
        if removed > 0 {
            self.sync()?;
        }
        Ok(removed)
    }

    /// Removes one file, ignoring a file that is already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails for another reason.
    pub fn remove(&self, name: LogFileName) -> CoreResult<()> {
        match fs::remove_file(self.file_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically renames an unfinished snapshot to its `.snap` name and
    /// makes the rename durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename or directory sync fails.
    pub fn promote(&self, unfinished: LogFileName) -> CoreResult<LogFileName> {
        let snap = unfinished.with_kind(LogKind::Snap);
        fs::rename(self.file_path(unfinished), self.file_path(snap))?;
        self.sync()?;
        Ok(snap)
    }

    /// Syncs directory entries so creates, renames and deletes survive a
    /// crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened or synced.
    pub fn sync(&self) -> CoreResult<()> {
        #[cfg(test)]
        self.syncs
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.sync_entries()
    }

    #[cfg(unix)]
    fn sync_entries(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// NTFS journals metadata; there is no directory handle to sync.
    #[cfg(not(unix))]
    fn sync_entries(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    fn name(ts: u64, kind: LogKind) -> LogFileName {
        LogFileName::new(ts, kind)
    }

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("wal");
        let dir = LogDir::open(&path, &Config::default()).unwrap();
        assert!(path.is_dir());
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(dir.path(), path);
    }

    #[test]
    fn open_missing_without_create_fails() {
        let temp = tempdir().unwrap();
        let config = Config::new().create_if_missing(false);
        let err = LogDir::open(&temp.path().join("nope"), &config).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDirectory { .. }));
    }

    #[test]
    fn open_file_path_fails() {
        let temp = tempdir().unwrap();
        touch(temp.path(), "plain");
        let err = LogDir::open(&temp.path().join("plain"), &Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDirectory { .. }));
    }

    #[test]
    fn second_open_is_locked_out() {
        let temp = tempdir().unwrap();
        let _first = LogDir::open(temp.path(), &Config::default()).unwrap();
        let err = LogDir::open(temp.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::DirectoryLocked { .. }));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(LogDir::open(temp.path(), &Config::default()).unwrap());
        assert!(LogDir::open(temp.path(), &Config::default()).is_ok());
    }

    #[test]
    fn unlocked_open_skips_lock_file() {
        let temp = tempdir().unwrap();
        let config = Config::new().lock_directory(false);
        let _a = LogDir::open(temp.path(), &config).unwrap();
        let _b = LogDir::open(temp.path(), &config).unwrap();
        assert!(!temp.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn scan_ignores_foreign_files() {
        let temp = tempdir().unwrap();
        for f in ["30.log", "10.snap", "README", "20.log.tmp", "25.unfinished"] {
            touch(temp.path(), f);
        }
        fs::create_dir(temp.path().join("40.log")).unwrap();

        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        assert_eq!(
            dir.scan().unwrap(),
            vec![
                name(10, LogKind::Snap),
                name(25, LogKind::Unfinished),
                name(30, LogKind::Log),
            ]
        );
    }

    #[test]
    fn scan_ignores_non_canonical_stamps() {
        let temp = tempdir().unwrap();
        for f in ["7.log", "0007.log", "07.snap", "0.log"] {
            touch(temp.path(), f);
        }

        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        let names = dir.scan().unwrap();
        assert_eq!(names, vec![name(0, LogKind::Log), name(7, LogKind::Log)]);
        for n in names {
            assert!(dir.file_path(n).is_file());
        }

        assert_eq!(dir.remove_older_than(100).unwrap(), 2);
        assert!(temp.path().join("0007.log").exists());
        assert!(temp.path().join("07.snap").exists());
    }

    #[test]
    fn create_file_syncs_directory() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        let name = dir.next_name(LogKind::Log);

        let writer = dir.create_file(name, false).unwrap();
        assert_eq!(dir.syncs.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(writer.name(), name);
        assert!(dir.file_path(name).is_file());

        assert!(dir.create_file(name, false).is_err());
    }

    #[test]
    fn manifest_uses_newest_snapshot() {
        let manifest = Manifest::from_names(&[
            name(50, LogKind::Log),
            name(10, LogKind::Snap),
            name(5, LogKind::Log),
            name(40, LogKind::Snap),
            name(45, LogKind::Unfinished),
            name(20, LogKind::Log),
            name(60, LogKind::Log),
        ]);
        assert_eq!(manifest.snapshot, Some(name(40, LogKind::Snap)));
        assert_eq!(
            manifest.logs,
            vec![name(50, LogKind::Log), name(60, LogKind::Log)]
        );
        assert_eq!(manifest.len(), 3);
    }

    #[test]
    fn manifest_without_snapshot_takes_all_logs() {
        let manifest = Manifest::from_names(&[name(2, LogKind::Log), name(1, LogKind::Log)]);
        assert!(manifest.snapshot.is_none());
        let files: Vec<_> = manifest.files().collect();
        assert_eq!(files, vec![name(1, LogKind::Log), name(2, LogKind::Log)]);
    }

    #[test]
    fn empty_manifest() {
        assert!(Manifest::from_names(&[]).is_empty());
    }

    #[test]
    fn stamps_strictly_increase_past_existing_files() {
        let temp = tempdir().unwrap();
        let future = u64::MAX - 10;
        touch(temp.path(), &format!("{future}.log"));

        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        let a = dir.next_stamp();
        let b = dir.next_stamp();
        assert_eq!(a, future + 1);
        assert_eq!(b, future + 2);
    }

    #[test]
    fn stamps_follow_clock() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        let mut prev = 0;
        for _ in 0..100 {
            let stamp = dir.next_stamp();
            assert!(stamp > prev);
            prev = stamp;
        }
        assert!(prev > 1_600_000_000_000_000_000);
    }

    #[test]
    fn remove_older_than_spares_newer_and_foreign() {
        let temp = tempdir().unwrap();
        for f in ["10.snap", "15.unfinished", "20.log", "30.snap", "40.log", "notes"] {
            touch(temp.path(), f);
        }
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();

        assert_eq!(dir.remove_older_than(30).unwrap(), 3);
        assert_eq!(
            dir.scan().unwrap(),
            vec![name(30, LogKind::Snap), name(40, LogKind::Log)]
        );
        assert!(temp.path().join("notes").exists());
        assert!(temp.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn promote_renames_to_snapshot() {
        let temp = tempdir().unwrap();
        touch(temp.path(), "7.unfinished");
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();

        let snap = dir.promote(name(7, LogKind::Unfinished)).unwrap();
        assert_eq!(snap, name(7, LogKind::Snap));
        assert_eq!(dir.scan().unwrap(), vec![snap]);
    }

    #[test]
    fn remove_tolerates_missing_file() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        dir.remove(name(1, LogKind::Unfinished)).unwrap();
    }
}
