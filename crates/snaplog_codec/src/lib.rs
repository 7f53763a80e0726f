//! # snaplog codec
//!
//! The [`Op`] model appended to snaplog files and its CBOR encoding.
//!
//! Encoding is self-describing and versioned; decoding never substitutes
//! defaults for a malformed record and reports a distinguishable
//! [`CodecError`] instead.
//!
//! ## Usage
//!
//! ```
//! use snaplog_codec::{decode_op, encode_op, Op};
//!
//! let op = Op::put_sub("users", "42", "alice").with_timestamp(1);
//! let bytes = encode_op(&op).unwrap();
//! assert_eq!(decode_op(&bytes).unwrap(), op);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod op;

pub use cbor::{decode_op, encode_op, FORMAT_VERSION};
pub use error::{CodecError, CodecResult};
pub use op::{Configuration, Op, OpKind, OpParts};
