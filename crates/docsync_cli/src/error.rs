//! CLI error type.

use docsync_codec::CodecError;
use docsync_core::CoreError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A document was not valid JSON.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Malformed JSON input or output.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path, mutation or patch failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Input that parsed but makes no sense.
    #[error("invalid input: {0}")]
    Input(String),
}

impl CliError {
    /// Creates an invalid input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }
}
