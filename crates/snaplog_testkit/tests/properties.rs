//! Property tests across codec, log files, compaction and the logger.

use proptest::prelude::*;
use snaplog_core::{compact, replay, Config, LogDir, LogKind, Logger, Op};
use snaplog_testkit::prelude::*;
use tempfile::TempDir;

fn replayed(dir: &LogDir) -> Vec<Op> {
    let mut ops = Vec::new();
    replay(dir, &dir.manifest().unwrap(), |op| ops.push(op)).unwrap();
    ops
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn compaction_preserves_state((snapshot, logs) in layout_strategy(4)) {
        let temp = TempDir::new().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        if let Some(ops) = &snapshot {
            write_file(&dir, LogKind::Snap, ops).unwrap();
        }
        for ops in &logs {
            write_file(&dir, LogKind::Log, ops).unwrap();
        }

        let before = replayed(&dir);
        let result = compact(&dir).unwrap().unwrap();
        let after = replayed(&dir);

        prop_assert_eq!(StateModel::from_ops(&before), StateModel::from_ops(&after));
        prop_assert!(after.len() <= before.len());
        prop_assert_eq!(result.ops_out as usize, after.len());
        prop_assert_eq!(list_files(temp.path()), vec![result.snapshot]);
    }

    #[test]
    fn compacting_twice_changes_nothing(ops in op_sequence_strategy(60)) {
        let temp = TempDir::new().unwrap();
        let dir = LogDir::open(temp.path(), &Config::default()).unwrap();
        write_file(&dir, LogKind::Log, &ops).unwrap();

        compact(&dir).unwrap();
        let once = replayed(&dir);
        compact(&dir).unwrap();
        prop_assert_eq!(replayed(&dir), once);
    }

    #[test]
    fn truncation_yields_prefix(ops in op_sequence_strategy(12)) {
        prop_assert_eq!(check_truncation_prefixes(&ops), Ok(()));
    }

    #[test]
    fn torn_append_yields_prefix(ops in op_sequence_strategy(20), cut in any::<prop::sample::Index>()) {
        let full = encode_log(&ops);
        let budget = cut.index(full.len() + 1);
        let backend = CrashableBackend::new().crash_after(budget);
        let handle = backend.handle();
        let mut writer = snaplog_core::LogWriter::with_backend(
            snaplog_core::LogFileName::new(1, LogKind::Log),
            "1.log".into(),
            Box::new(backend),
            false,
        );
        let mut appended = 0;
        for op in &ops {
            if writer.append(op).is_err() {
                break;
            }
            appended += 1;
        }
        drop(writer);

        let (read, _) = replay_bytes(&handle.bytes()).unwrap();
        prop_assert_eq!(read.as_slice(), &ops[..appended]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn logger_with_rotation_matches_model(ops in op_sequence_strategy(200), limit in 64u64..1024) {
        let temp = TempDir::new().unwrap();
        let logger = Logger::open(temp.path(), Config::new().max_log_size(limit)).unwrap();
        record_ops(&logger, &ops).unwrap();
        prop_assert_eq!(logger.stats().failed_compactions, 0);

        let expected = StateModel::from_ops(&ops);
        prop_assert_eq!(StateModel::from_ops(&collect_ops(&logger)), expected.clone());

        drop(logger);
        let logger = Logger::new(temp.path()).unwrap();
        prop_assert_eq!(StateModel::from_ops(&collect_ops(&logger)), expected);
    }
}

#[test]
fn recorded_sequence_replays_verbatim_without_limit() {
    init_test_tracing();
    let fixture = TestLogger::new();
    let ops: Vec<Op> = (0..50)
        .map(|i| Op::put_sub("users", format!("{i}"), format!("name-{i}")).with_timestamp(i))
        .collect();
    record_ops(&fixture, &ops).unwrap();
    assert_eq!(collect_ops(&fixture), ops);
}

#[test]
fn restart_after_compaction_replays_snapshot() {
    let fixture = TestLogger::with_config(Config::new().max_log_size(256));
    let ops: Vec<Op> = (0..300)
        .map(|i| Op::put(format!("k{}", i % 10), format!("{i}")))
        .collect();
    record_ops(&fixture, &ops).unwrap();
    assert!(fixture.stats().compactions > 0);

    let fixture = fixture.reopen();
    let model = StateModel::from_ops(&collect_ops(&fixture));
    assert_eq!(model, StateModel::from_ops(&ops));
    assert_eq!(
        fixture.files().iter().filter(|n| n.kind == LogKind::Snap).count(),
        1
    );
}
