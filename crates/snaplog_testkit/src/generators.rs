//! Property-based test generators using proptest.
//!
//! Keys come from a small alphabet so generated sequences overwrite,
//! delete and clear the same entries often enough to exercise compaction.

use proptest::prelude::*;
use snaplog_codec::{Configuration, Op};

/// Strategy for keys and subkeys drawn from a small space.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(|k| k.as_bytes().to_vec())
}

/// Strategy for values (arbitrary bytes, possibly empty).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..32)
}

/// Strategy for small configuration maps.
pub fn configuration_strategy() -> impl Strategy<Value = Configuration> {
    prop::collection::btree_map("[a-c]", "[a-z0-9]{0,4}", 0..3)
}

/// Strategy for single operations of every kind, weighted towards puts.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    let op = prop_oneof![
        6 => (key_strategy(), value_strategy()).prop_map(|(k, v)| Op::put(k, v)),
        6 => (key_strategy(), key_strategy(), value_strategy())
            .prop_map(|(k, s, v)| Op::put_sub(k, s, v)),
        3 => key_strategy().prop_map(Op::delete),
        3 => (key_strategy(), key_strategy()).prop_map(|(k, s)| Op::delete_sub(k, s)),
        1 => Just(Op::clear_all()),
        1 => key_strategy().prop_map(Op::clear_key),
        1 => configuration_strategy().prop_map(Op::config),
        2 => (key_strategy(), configuration_strategy())
            .prop_map(|(k, c)| Op::config_entry(k, c)),
    ];
    (op, any::<i64>()).prop_map(|(op, ts)| op.with_timestamp(ts))
}

/// Strategy for operation sequences of up to `max_len` operations.
pub fn op_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 0..=max_len)
}

/// Strategy for a directory layout: an optional snapshot followed by up to
/// `max_logs` segments.
pub fn layout_strategy(max_logs: usize) -> impl Strategy<Value = (Option<Vec<Op>>, Vec<Vec<Op>>)> {
    (
        prop::option::of(op_sequence_strategy(20)),
        prop::collection::vec(op_sequence_strategy(20), 1..=max_logs),
    )
}
