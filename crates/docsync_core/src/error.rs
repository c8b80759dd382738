//! Error types for docsync core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docsync core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// JSON codec error.
    #[error("codec error: {0}")]
    Codec(#[from] docsync_codec::CodecError),

    /// Malformed path expression.
    #[error("path syntax error at {position}: {message}")]
    PathSyntax {
        /// Description of the syntax error.
        message: String,
        /// Byte offset into the expression text.
        position: usize,
    },

    /// Comparison operator outside the supported set.
    #[error("unsupported comparison operator: {operator}")]
    UnsupportedOperator {
        /// The operator text.
        operator: String,
    },

    /// An operation was applied to a value it structurally cannot apply to.
    #[error("precondition failed: {message}")]
    Precondition {
        /// Description of the violated precondition.
        message: String,
    },

    /// The document revision did not match the revision a mutation expects.
    #[error("revision conflict: expected {expected}, document is at {}", actual.as_deref().unwrap_or("<none>"))]
    RevisionConflict {
        /// Revision the mutation was computed against.
        expected: String,
        /// Revision of the document it was applied to.
        actual: Option<String>,
    },

    /// Mutation payload is malformed.
    #[error("invalid mutation: {message}")]
    InvalidMutation {
        /// Description of the problem.
        message: String,
    },

    /// Diff-match-patch text could not be parsed.
    #[error("invalid diff-match-patch text: {message}")]
    InvalidPatch {
        /// Description of the problem.
        message: String,
    },

    /// Staging requires a transaction id to correlate the server echo.
    #[error("mutation has no transaction id")]
    MissingTransactionId,

    /// The incoming mutation queue did not settle within the configured bound.
    #[error("incoming mutations did not settle after {limit} passes")]
    IncomingLoopExceeded {
        /// The configured bound.
        limit: usize,
    },

    /// A document operation was issued in the wrong state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a path syntax error.
    pub fn path_syntax(message: impl Into<String>, position: usize) -> Self {
        Self::PathSyntax {
            message: message.into(),
            position,
        }
    }

    /// Creates a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Creates a revision conflict error.
    pub fn revision_conflict(expected: impl Into<String>, actual: Option<&str>) -> Self {
        Self::RevisionConflict {
            expected: expected.into(),
            actual: actual.map(str::to_string),
        }
    }

    /// Creates an invalid mutation error.
    pub fn invalid_mutation(message: impl Into<String>) -> Self {
        Self::InvalidMutation {
            message: message.into(),
        }
    }

    /// Creates an invalid patch text error.
    pub fn invalid_patch(message: impl Into<String>) -> Self {
        Self::InvalidPatch {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for the optimistic-concurrency failure.
    ///
    /// A conflicting incoming mutation is not applicable yet; it is not a
    /// terminal failure.
    pub fn is_revision_conflict(&self) -> bool {
        matches!(self, Self::RevisionConflict { .. })
    }

    /// Returns true if the error signals a broken protocol invariant.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IncomingLoopExceeded { .. })
    }
}
