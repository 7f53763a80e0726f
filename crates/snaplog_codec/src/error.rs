//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building, encoding or decoding an [`crate::Op`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode an operation to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// The bytes are not well-formed CBOR.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Well-formed CBOR that does not describe an operation.
    #[error("invalid operation structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// Record written by a newer format version.
    #[error("unsupported operation format version {found} (max {supported})")]
    UnsupportedVersion {
        /// Version found in the record.
        found: u64,
        /// Highest version this build reads.
        supported: u64,
    },

    /// Flat operation fields that do not name exactly one operation.
    #[error("ambiguous operation: {reason}")]
    AmbiguousOp {
        /// Which combination was rejected.
        reason: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an ambiguous operation error.
    pub fn ambiguous(reason: impl Into<String>) -> Self {
        Self::AmbiguousOp {
            reason: reason.into(),
        }
    }
}
