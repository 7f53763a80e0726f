//! Benchmark utilities.

#![warn(missing_docs)]

use snaplog_core::{Config, LogDir, LogKind, LogWriter, Op};
use std::path::Path;

/// Deterministic filler bytes of the given size.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

/// `count` flat puts over `keys` distinct keys with `value_size`-byte values.
pub fn overwrite_workload(count: usize, keys: usize, value_size: usize) -> Vec<Op> {
    (0..count)
        .map(|i| Op::put(format!("key-{}", i % keys.max(1)), payload(value_size)))
        .collect()
}

/// A mixed workload: tree puts, subkey deletes and periodic clears.
pub fn mixed_workload(count: usize) -> Vec<Op> {
    (0..count)
        .map(|i| match i % 10 {
            0..=5 => Op::put_sub(format!("user-{}", i % 50), format!("f{}", i % 7), payload(32)),
            6 | 7 => Op::put(format!("flag-{}", i % 20), "1"),
            8 => Op::delete_sub(format!("user-{}", i % 50), format!("f{}", i % 7)),
            _ => Op::delete(format!("flag-{}", i % 20)),
        })
        .collect()
}

/// Opens `path` as an unlocked log directory and writes `segments` closed
/// segments of `ops` each.
pub fn populate(path: &Path, segments: usize, ops: &[Op]) -> LogDir {
    let dir = LogDir::open(path, &Config::new().lock_directory(false))
        .expect("Failed to open log directory");
    for _ in 0..segments {
        let mut writer = LogWriter::create(dir.path(), dir.next_name(LogKind::Log), false)
            .expect("Failed to create segment");
        for op in ops {
            writer.append(op).expect("Failed to append");
        }
        writer.close().expect("Failed to close segment");
    }
    dir
}
