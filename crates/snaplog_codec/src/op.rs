//! The operation model.

use crate::error::{CodecError, CodecResult};
use std::collections::BTreeMap;

/// A whole-of-system or per-entry configuration payload.
pub type Configuration = BTreeMap<String, String>;

/// The change an [`Op`] describes.
///
/// Exactly one category is active per operation, so ambiguous flag
/// combinations cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Upsert `value` at `key`, or at `key`/`subkey` in the tree namespace.
    Put {
        /// Flat key, or the parent key when `subkey` is set.
        key: Vec<u8>,
        /// Child key in the two-level namespace.
        subkey: Option<Vec<u8>>,
        /// Value to store.
        value: Vec<u8>,
    },
    /// Remove `key` (and its subtree), or only `key`/`subkey`.
    Delete {
        /// Flat key, or the parent key when `subkey` is set.
        key: Vec<u8>,
        /// Child key in the two-level namespace.
        subkey: Option<Vec<u8>>,
    },
    /// With no key, empty the flat namespace; with a key, drop its subtree.
    Clear {
        /// Parent key whose subtree is dropped.
        key: Option<Vec<u8>>,
    },
    /// Replace the single latest global configuration.
    ConfigGlobal {
        /// The configuration.
        configuration: Configuration,
    },
    /// Set one named configuration entry.
    ConfigEntry {
        /// Entry name.
        key: Vec<u8>,
        /// The configuration.
        configuration: Configuration,
    },
}

impl OpKind {
    /// Numeric tag used on disk.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Put { .. } => 1,
            Self::Delete { .. } => 2,
            Self::Clear { .. } => 3,
            Self::ConfigGlobal { .. } => 4,
            Self::ConfigEntry { .. } => 5,
        }
    }

    /// Short name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Delete { .. } => "delete",
            Self::Clear { .. } => "clear",
            Self::ConfigGlobal { .. } => "config",
            Self::ConfigEntry { .. } => "config-entry",
        }
    }
}

/// The atomic unit of durable change.
///
/// `timestamp` is logical time assigned by the caller; the log carries it
/// but never interprets it.
///
/// # Example
///
/// ```rust
/// use snaplog_codec::Op;
///
/// let op = Op::put("user:1", "alice").with_timestamp(7);
/// assert!(op.is_put());
/// assert_eq!(op.key(), Some(&b"user:1"[..]));
/// assert_eq!(op.timestamp, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    /// Caller-assigned logical time.
    pub timestamp: i64,
    /// What the operation does.
    pub kind: OpKind,
}

impl Op {
    /// Wraps a kind with timestamp zero.
    #[must_use]
    pub fn new(kind: OpKind) -> Self {
        Self { timestamp: 0, kind }
    }

    /// Upsert in the flat namespace.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(OpKind::Put {
            key: key.into(),
            subkey: None,
            value: value.into(),
        })
    }

    /// Upsert one child of `key` in the tree namespace.
    pub fn put_sub(
        key: impl Into<Vec<u8>>,
        subkey: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(OpKind::Put {
            key: key.into(),
            subkey: Some(subkey.into()),
            value: value.into(),
        })
    }

    /// Delete a flat key together with any subtree stored under it.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::new(OpKind::Delete {
            key: key.into(),
            subkey: None,
        })
    }

    /// Delete one child of `key`.
    pub fn delete_sub(key: impl Into<Vec<u8>>, subkey: impl Into<Vec<u8>>) -> Self {
        Self::new(OpKind::Delete {
            key: key.into(),
            subkey: Some(subkey.into()),
        })
    }

    /// Empty the flat namespace.
    #[must_use]
    pub fn clear_all() -> Self {
        Self::new(OpKind::Clear { key: None })
    }

    /// Drop the whole subtree under `key`.
    pub fn clear_key(key: impl Into<Vec<u8>>) -> Self {
        Self::new(OpKind::Clear {
            key: Some(key.into()),
        })
    }

    /// Replace the latest global configuration.
    #[must_use]
    pub fn config(configuration: Configuration) -> Self {
        Self::new(OpKind::ConfigGlobal { configuration })
    }

    /// Set the configuration entry named `key`.
    pub fn config_entry(key: impl Into<Vec<u8>>, configuration: Configuration) -> Self {
        Self::new(OpKind::ConfigEntry {
            key: key.into(),
            configuration,
        })
    }

    /// Sets the logical timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The key, if this kind carries one.
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        match &self.kind {
            OpKind::Put { key, .. }
            | OpKind::Delete { key, .. }
            | OpKind::ConfigEntry { key, .. } => Some(key),
            OpKind::Clear { key } => key.as_deref(),
            OpKind::ConfigGlobal { .. } => None,
        }
    }

    /// The subkey, for tree puts and deletes.
    #[must_use]
    pub fn subkey(&self) -> Option<&[u8]> {
        match &self.kind {
            OpKind::Put { subkey, .. } | OpKind::Delete { subkey, .. } => subkey.as_deref(),
            _ => None,
        }
    }

    /// The value, for puts.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        match &self.kind {
            OpKind::Put { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The configuration payload, for configuration ops.
    #[must_use]
    pub fn configuration(&self) -> Option<&Configuration> {
        match &self.kind {
            OpKind::ConfigGlobal { configuration } | OpKind::ConfigEntry { configuration, .. } => {
                Some(configuration)
            }
            _ => None,
        }
    }

    /// Returns true for puts.
    #[must_use]
    pub fn is_put(&self) -> bool {
        matches!(self.kind, OpKind::Put { .. })
    }

    /// Flattens into the legacy field-and-flag form.
    #[must_use]
    pub fn into_parts(self) -> OpParts {
        let mut parts = OpParts {
            timestamp: self.timestamp,
            ..OpParts::default()
        };
        match self.kind {
            OpKind::Put { key, subkey, value } => {
                parts.key = Some(key);
                parts.subkey = subkey;
                parts.value = Some(value);
                parts.put = true;
            }
            OpKind::Delete { key, subkey } => {
                parts.key = Some(key);
                parts.subkey = subkey;
            }
            OpKind::Clear { key } => {
                parts.key = key;
                parts.clear = true;
            }
            OpKind::ConfigGlobal { configuration } => {
                parts.configuration = Some(configuration);
            }
            OpKind::ConfigEntry { key, configuration } => {
                parts.key = Some(key);
                parts.configuration = Some(configuration);
            }
        }
        parts
    }
}

/// Flat field-and-flag form of an operation.
///
/// Callers that carry operations as a single record with boolean flags
/// convert through [`Op::try_from`], which rejects every combination that
/// does not name exactly one [`OpKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpParts {
    /// Flat key or parent key.
    pub key: Option<Vec<u8>>,
    /// Child key.
    pub subkey: Option<Vec<u8>>,
    /// Value for puts.
    pub value: Option<Vec<u8>>,
    /// Caller-assigned logical time.
    pub timestamp: i64,
    /// Upsert flag.
    pub put: bool,
    /// Clear flag.
    pub clear: bool,
    /// Configuration payload.
    pub configuration: Option<Configuration>,
}

impl TryFrom<OpParts> for Op {
    type Error = CodecError;

    fn try_from(parts: OpParts) -> CodecResult<Self> {
        let OpParts {
            key,
            subkey,
            value,
            timestamp,
            put,
            clear,
            configuration,
        } = parts;

        let kind = if let Some(configuration) = configuration {
            if put || clear {
                return Err(CodecError::ambiguous("configuration combined with put or clear"));
            }
            if value.is_some() || subkey.is_some() {
                return Err(CodecError::ambiguous("configuration carries a value or subkey"));
            }
            match key {
                Some(key) => OpKind::ConfigEntry { key, configuration },
                None => OpKind::ConfigGlobal { configuration },
            }
        } else if put && clear {
            return Err(CodecError::ambiguous("put and clear both set"));
        } else if put {
            let key = key.ok_or_else(|| CodecError::ambiguous("put without key"))?;
            let value = value.ok_or_else(|| CodecError::ambiguous("put without value"))?;
            OpKind::Put { key, subkey, value }
        } else if clear {
            if subkey.is_some() {
                return Err(CodecError::ambiguous("clear with subkey"));
            }
            if value.is_some() {
                return Err(CodecError::ambiguous("clear with value"));
            }
            OpKind::Clear { key }
        } else {
            if value.is_some() {
                return Err(CodecError::ambiguous("value without put"));
            }
            let key = key.ok_or_else(|| CodecError::ambiguous("delete without key"))?;
            OpKind::Delete { key, subkey }
        };

        Ok(Self { timestamp, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(pairs: &[(&str, &str)]) -> Configuration {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parts_roundtrip_every_kind() {
        let ops = vec![
            Op::put("a", "1").with_timestamp(3),
            Op::put_sub("a", "b", "2"),
            Op::delete("a"),
            Op::delete_sub("a", "b"),
            Op::clear_all(),
            Op::clear_key("a"),
            Op::config(conf(&[("mode", "fast")])),
            Op::config_entry("node-1", conf(&[("addr", "10.0.0.1")])),
        ];
        for op in ops {
            let back = Op::try_from(op.clone().into_parts()).unwrap();
            assert_eq!(back, op);
        }
    }

    #[test]
    fn put_and_clear_rejected() {
        let parts = OpParts {
            key: Some(b"a".to_vec()),
            put: true,
            clear: true,
            ..OpParts::default()
        };
        assert!(matches!(
            Op::try_from(parts),
            Err(CodecError::AmbiguousOp { .. })
        ));
    }

    #[test]
    fn configuration_with_put_rejected() {
        let parts = OpParts {
            put: true,
            configuration: Some(conf(&[("a", "b")])),
            ..OpParts::default()
        };
        assert!(Op::try_from(parts).is_err());
    }

    #[test]
    fn keyless_delete_rejected() {
        assert!(Op::try_from(OpParts::default()).is_err());
    }

    #[test]
    fn value_without_put_rejected() {
        let parts = OpParts {
            key: Some(b"a".to_vec()),
            value: Some(b"1".to_vec()),
            ..OpParts::default()
        };
        assert!(Op::try_from(parts).is_err());
    }

    #[test]
    fn clear_with_subkey_rejected() {
        let parts = OpParts {
            key: Some(b"a".to_vec()),
            subkey: Some(b"b".to_vec()),
            clear: true,
            ..OpParts::default()
        };
        assert!(Op::try_from(parts).is_err());
    }

    #[test]
    fn put_without_value_rejected() {
        let parts = OpParts {
            key: Some(b"a".to_vec()),
            put: true,
            ..OpParts::default()
        };
        let err = Op::try_from(parts).unwrap_err();
        assert!(matches!(err, CodecError::AmbiguousOp { .. }));
    }

    #[test]
    fn put_with_empty_value_accepted() {
        let parts = OpParts {
            key: Some(b"a".to_vec()),
            value: Some(Vec::new()),
            put: true,
            ..OpParts::default()
        };
        assert_eq!(Op::try_from(parts).unwrap(), Op::put("a", ""));
    }

    #[test]
    fn accessors() {
        let op = Op::put_sub("k", "s", "v");
        assert_eq!(op.key(), Some(&b"k"[..]));
        assert_eq!(op.subkey(), Some(&b"s"[..]));
        assert_eq!(op.value(), Some(&b"v"[..]));
        assert!(op.configuration().is_none());

        let op = Op::clear_all();
        assert_eq!(op.key(), None);
        assert_eq!(op.kind.name(), "clear");
        assert_eq!(op.kind.code(), 3);
    }
}
