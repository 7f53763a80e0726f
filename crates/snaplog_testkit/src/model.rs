//! Reference state model.
//!
//! Applies operations to plain maps so tests can compare the state two
//! different operation sequences produce.

use snaplog_codec::{Configuration, Op, OpKind};
use std::collections::BTreeMap;

/// The state a sequence of operations describes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateModel {
    /// Flat namespace.
    pub flat: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Two-level namespace.
    pub tree: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Latest global configuration.
    pub config: Option<Configuration>,
    /// Per-entry configurations.
    pub config_entries: BTreeMap<Vec<u8>, Configuration>,
}

impl StateModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the state of a whole sequence.
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a Op>) -> Self {
        let mut model = Self::new();
        for op in ops {
            model.apply(op);
        }
        model
    }

    /// Applies one operation.
    pub fn apply(&mut self, op: &Op) {
        match &op.kind {
            OpKind::Put {
                key,
                subkey: None,
                value,
            } => {
                self.flat.insert(key.clone(), value.clone());
            }
            OpKind::Put {
                key,
                subkey: Some(subkey),
                value,
            } => {
                self.tree
                    .entry(key.clone())
                    .or_default()
                    .insert(subkey.clone(), value.clone());
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
            OpKind::ConfigGlobal { configuration } => self.config = Some(configuration.clone()),
            OpKind::ConfigEntry { key, configuration } => {
                self.config_entries.insert(key.clone(), configuration.clone());
            }
        }
    }

    /// Flat value at `key`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.flat.get(key).map(Vec::as_slice)
    }

    /// Tree value at `key`/`subkey`.
    pub fn get_sub(&self, key: &[u8], subkey: &[u8]) -> Option<&[u8]> {
        self.tree.get(key)?.get(subkey).map(Vec::as_slice)
    }

    /// Returns true when nothing is stored and no configuration is set.
    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
            && self.tree.is_empty()
            && self.config.is_none()
            && self.config_entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_independent() {
        let model = StateModel::from_ops(&[
            Op::put("k", "flat"),
            Op::put_sub("k", "s", "tree"),
            Op::clear_all(),
        ]);
        assert_eq!(model.get(b"k"), None);
        assert_eq!(model.get_sub(b"k", b"s"), Some(&b"tree"[..]));
    }

    #[test]
    fn key_delete_clears_both() {
        let model = StateModel::from_ops(&[
            Op::put("k", "flat"),
            Op::put_sub("k", "s", "tree"),
            Op::delete("k"),
        ]);
        assert!(model.is_empty());
    }

    #[test]
    fn config_layers() {
        let conf: Configuration = [("a".to_string(), "1".to_string())].into();
        let model = StateModel::from_ops(&[
            Op::config(conf.clone()),
            Op::config_entry("e", conf.clone()),
        ]);
        assert_eq!(model.config, Some(conf.clone()));
        assert_eq!(model.config_entries.get(&b"e"[..]), Some(&conf));
    }
}
