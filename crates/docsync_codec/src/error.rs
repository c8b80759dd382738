//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value to JSON.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode JSON text.
    #[error("decoding failed at line {line}, column {column}: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
        /// Line of the offending input (1-based, 0 when unknown).
        line: usize,
        /// Column of the offending input (1-based, 0 when unknown).
        column: usize,
    },

    /// NaN and infinities have no JSON representation.
    #[error("non-finite float values cannot be encoded")]
    NonFiniteFloat,

    /// The value does not have the expected shape.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// The value has an unexpected type.
    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        /// Name of the expected type.
        expected: &'static str,
        /// Name of the type that was found.
        found: &'static str,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() || (err.is_data() && err.line() == 0) {
            return Self::encoding_failed(err.to_string());
        }
        Self::DecodingFailed {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}
