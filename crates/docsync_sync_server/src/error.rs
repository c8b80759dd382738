//! Error types for the reference store.

use docsync_core::CoreError;
use docsync_sync_protocol::ErrorResponse;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown endpoint or dataset.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request contradicts the stored documents.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A mutation failed to apply.
    #[error(transparent)]
    Mutation(#[from] CoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates an invalid request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// HTTP status of the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::NotFound(_) => 404,
            ServerError::Conflict(_) => 409,
            ServerError::Mutation(
                CoreError::RevisionConflict { .. } | CoreError::Precondition { .. },
            ) => 409,
            ServerError::Mutation(_) => 400,
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// The JSON error body.
    pub fn to_response(&self) -> ErrorResponse {
        let error = match self.status_code() {
            400 => "Bad Request",
            404 => "Not Found",
            409 => "Conflict",
            _ => "Internal Server Error",
        };
        ErrorResponse {
            status_code: self.status_code(),
            error: error.to_string(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::invalid("bad").is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::invalid("bad").is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::invalid("bad").status_code(), 400);
        assert_eq!(ServerError::conflict("exists").status_code(), 409);
        assert_eq!(
            ServerError::from(CoreError::revision_conflict("r1", Some("r2"))).status_code(),
            409
        );
        assert_eq!(
            ServerError::from(CoreError::invalid_mutation("bad")).status_code(),
            400
        );
    }

    #[test]
    fn error_body() {
        let body = ServerError::conflict("document exists").to_response();
        assert_eq!(body.status_code, 409);
        assert_eq!(body.error, "Conflict");
        assert!(body.message.contains("document exists"));
    }
}
