//! CBOR encoding of operations.
//!
//! An operation is a CBOR map with short text keys:
//!
//! ```text
//! { "v": 1, "t": <kind code>, "ts": <i64>,
//!   "k": <bytes>?, "s": <bytes>?, "val": <bytes>?, "cfg": {text: text}? }
//! ```
//!
//! Unknown fields are ignored so later versions can add optional data
//! without a version bump; a version above [`FORMAT_VERSION`] is rejected.

use crate::error::{CodecError, CodecResult};
use crate::op::{Configuration, Op, OpKind};
use ciborium::value::{Integer, Value};

/// Current operation format version.
pub const FORMAT_VERSION: u64 = 1;

/// Encodes an operation to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the CBOR serializer fails.
pub fn encode_op(op: &Op) -> CodecResult<Vec<u8>> {
    let mut pairs = vec![
        (text("v"), Value::Integer(Integer::from(FORMAT_VERSION))),
        (text("t"), Value::Integer(Integer::from(op.kind.code()))),
        (text("ts"), Value::Integer(Integer::from(op.timestamp))),
    ];

    match &op.kind {
        OpKind::Put { key, subkey, value } => {
            pairs.push((text("k"), Value::Bytes(key.clone())));
            if let Some(subkey) = subkey {
                pairs.push((text("s"), Value::Bytes(subkey.clone())));
            }
            pairs.push((text("val"), Value::Bytes(value.clone())));
        }
        OpKind::Delete { key, subkey } => {
            pairs.push((text("k"), Value::Bytes(key.clone())));
            if let Some(subkey) = subkey {
                pairs.push((text("s"), Value::Bytes(subkey.clone())));
            }
        }
        OpKind::Clear { key } => {
            if let Some(key) = key {
                pairs.push((text("k"), Value::Bytes(key.clone())));
            }
        }
        OpKind::ConfigGlobal { configuration } => {
            pairs.push((text("cfg"), encode_configuration(configuration)));
        }
        OpKind::ConfigEntry { key, configuration } => {
            pairs.push((text("k"), Value::Bytes(key.clone())));
            pairs.push((text("cfg"), encode_configuration(configuration)));
        }
    }

    let mut buf = Vec::new();
    ciborium::ser::into_writer(&Value::Map(pairs), &mut buf)
        .map_err(|e| CodecError::encoding_failed(format!("{e:?}")))?;
    Ok(buf)
}

/// Decodes an operation from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] for malformed CBOR or trailing
/// bytes, [`CodecError::InvalidStructure`] for CBOR that is not an
/// operation, and [`CodecError::UnsupportedVersion`] for newer formats.
/// Missing optional fields never fall back to defaults for required ones.
pub fn decode_op(bytes: &[u8]) -> CodecResult<Op> {
    let mut reader = bytes;
    let value: Value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(format!("{e:?}")))?;
    if !reader.is_empty() {
        return Err(CodecError::decoding_failed(format!(
            "{} trailing bytes after operation",
            reader.len()
        )));
    }

    let map = value
        .as_map()
        .ok_or_else(|| CodecError::invalid_structure("expected map for operation"))?;

    let field = |name: &str| {
        map.iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    };

    let version = field("v")
        .and_then(Value::as_integer)
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| CodecError::invalid_structure("missing version"))?;
    if version == 0 || version > FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    let code = field("t")
        .and_then(Value::as_integer)
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| CodecError::invalid_structure("missing operation type"))?;

    let timestamp = field("ts")
        .and_then(Value::as_integer)
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| CodecError::invalid_structure("missing timestamp"))?;

    let bytes_field = |name: &str| -> CodecResult<Option<Vec<u8>>> {
        match field(name) {
            None => Ok(None),
            Some(v) => v
                .as_bytes()
                .map(|b| Some(b.clone()))
                .ok_or_else(|| CodecError::invalid_structure(format!("{name} must be bytes"))),
        }
    };
    let required = |name: &str| -> CodecResult<Vec<u8>> {
        bytes_field(name)?.ok_or_else(|| CodecError::invalid_structure(format!("missing {name}")))
    };
    let configuration = || -> CodecResult<Configuration> {
        let value =
            field("cfg").ok_or_else(|| CodecError::invalid_structure("missing cfg"))?;
        decode_configuration(value)
    };

    let kind = match code {
        1 => OpKind::Put {
            key: required("k")?,
            subkey: bytes_field("s")?,
            value: required("val")?,
        },
        2 => OpKind::Delete {
            key: required("k")?,
            subkey: bytes_field("s")?,
        },
        3 => OpKind::Clear {
            key: bytes_field("k")?,
        },
        4 => OpKind::ConfigGlobal {
            configuration: configuration()?,
        },
        5 => OpKind::ConfigEntry {
            key: required("k")?,
            configuration: configuration()?,
        },
        other => {
            return Err(CodecError::invalid_structure(format!(
                "unknown operation type {other}"
            )))
        }
    };

    Ok(Op { timestamp, kind })
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn encode_configuration(configuration: &Configuration) -> Value {
    Value::Map(
        configuration
            .iter()
            .map(|(k, v)| (Value::Text(k.clone()), Value::Text(v.clone())))
            .collect(),
    )
}

fn decode_configuration(value: &Value) -> CodecResult<Configuration> {
    let pairs = value
        .as_map()
        .ok_or_else(|| CodecError::invalid_structure("cfg must be a map"))?;
    pairs
        .iter()
        .map(|(k, v)| match (k.as_text(), v.as_text()) {
            (Some(k), Some(v)) => Ok((k.to_string(), v.to_string())),
            _ => Err(CodecError::invalid_structure("cfg entries must be text")),
        })
        .collect()
}
