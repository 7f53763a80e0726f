//! Test fixtures and logger helpers.

use snaplog_core::{Config, CoreResult, LogDir, LogFileName, LogKind, LogWriter, Logger, Op};
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A logger over a temporary directory that is removed on drop.
pub struct TestLogger {
    /// The logger instance.
    pub logger: Logger,
    /// Kept alive so the directory outlives the logger.
    temp_dir: TempDir,
}

impl TestLogger {
    /// Opens a logger with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Opens a logger with `config`.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let logger = Logger::open(temp_dir.path(), config).expect("Failed to open logger");
        Self { logger, temp_dir }
    }

    /// The log directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Drops the logger (stopping it if recording) and opens a new one over
    /// the same directory, as a process restart would.
    pub fn reopen(self) -> Self {
        let Self { logger, temp_dir } = self;
        let config = logger.config().clone();
        drop(logger);
        let logger = Logger::open(temp_dir.path(), config).expect("Failed to reopen logger");
        Self { logger, temp_dir }
    }

    /// Names of the snapshot, segment and unfinished files on disk.
    pub fn files(&self) -> Vec<LogFileName> {
        list_files(self.path())
    }
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestLogger {
    type Target = Logger;

    fn deref(&self) -> &Self::Target {
        &self.logger
    }
}

/// Runs a test with a logger over a fresh temporary directory.
///
/// # Example
///
/// ```rust,ignore
/// use snaplog_testkit::with_temp_logger;
///
/// with_temp_logger(|logger| {
///     logger.record().unwrap();
///     logger.stop().unwrap();
/// });
/// ```
pub fn with_temp_logger<F, R>(f: F) -> R
where
    F: FnOnce(&Logger) -> R,
{
    let fixture = TestLogger::new();
    f(&fixture)
}

/// Records `ops` into a fresh segment and stops.
pub fn record_ops(logger: &Logger, ops: &[Op]) -> CoreResult<LogFileName> {
    let name = logger.record()?;
    for op in ops {
        logger.dump(op.clone())?;
    }
    logger.stop()?;
    Ok(name)
}

/// Replays everything the logger would deliver.
pub fn collect_ops(logger: &Logger) -> Vec<Op> {
    let mut ops = Vec::new();
    logger.play(|op| ops.push(op)).expect("Failed to replay");
    ops
}

/// Writes `ops` as a closed file of the given kind, bypassing the writer
/// thread. Used to build snapshot-plus-segments layouts directly.
pub fn write_file(dir: &LogDir, kind: LogKind, ops: &[Op]) -> CoreResult<LogFileName> {
    let name = dir.next_name(kind);
    let mut writer = LogWriter::create(dir.path(), name, false)?;
    for op in ops {
        writer.append(op)?;
    }
    writer.close()?;
    Ok(name)
}

/// Lists parseable file names in `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<LogFileName> {
    let mut names: Vec<LogFileName> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();
    names.sort();
    names
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_sees_recorded_ops() {
        init_test_tracing();
        let fixture = TestLogger::new();
        record_ops(&fixture, &[Op::put("a", "1")]).unwrap();

        let fixture = fixture.reopen();
        assert_eq!(collect_ops(&fixture), vec![Op::put("a", "1")]);
        assert_eq!(fixture.files().len(), 1);
    }

    #[test]
    fn write_file_builds_layout() {
        let temp = TempDir::new().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        let snap = write_file(&dir, LogKind::Snap, &[Op::put("a", "1")]).unwrap();
        let log = write_file(&dir, LogKind::Log, &[Op::delete("a")]).unwrap();

        assert_eq!(list_files(temp.path()), vec![snap, log]);
        let manifest = dir.manifest().unwrap();
        assert_eq!(manifest.snapshot, Some(snap));
        assert_eq!(manifest.logs, vec![log]);
    }

    #[test]
    fn with_temp_logger_returns_value() {
        let n = with_temp_logger(|logger| {
            record_ops(logger, &[Op::clear_all(), Op::clear_all()]).unwrap();
            collect_ops(logger).len()
        });
        assert_eq!(n, 2);
    }
}
