//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A JSON body could not be encoded or decoded.
    #[error("json error: {message}")]
    Json {
        /// Description of the JSON error.
        message: String,
    },

    /// Document value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] docsync_codec::CodecError),

    /// A server-sent event frame was malformed.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Description of the problem.
        message: String,
    },

    /// The listener reported an error on its channel.
    #[error("channel error: {message}")]
    ChannelError {
        /// Message sent by the server.
        message: String,
    },

    /// A mutation cannot be expressed as a document action.
    #[error("invalid action: {message}")]
    InvalidAction {
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Create an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }

    /// Create an invalid action error.
    pub fn invalid_action(message: impl Into<String>) -> Self {
        Self::InvalidAction {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}
