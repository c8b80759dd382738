//! Error types for the sync engine.

use docsync_core::CoreError;
use docsync_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Statuses treated as "the server will never accept this request".
pub const HARD_CANCEL_STATUSES: std::ops::RangeInclusive<u16> = 400..=500;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("server responded {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error description from the body.
        message: String,
    },

    /// Wire format error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Document engine error.
    #[error("document error: {0}")]
    Core(#[from] CoreError),

    /// Documents are not loaded yet; the listener has not said welcome.
    #[error("documents are not loaded yet")]
    NotReady,

    /// No synchronizer instance exists.
    #[error("no instance; send construct first")]
    NotConstructed,

    /// A synchronizer instance already exists.
    #[error("an instance already exists; dispose it first")]
    AlreadyConstructed,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// HTTP status, if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SyncError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if a commit failing with this error must be cancelled
    /// together with every commit queued after it.
    pub fn is_hard_cancel(&self) -> bool {
        self.status_code()
            .is_some_and(|status| HARD_CANCEL_STATUSES.contains(&status))
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            SyncError::Http { .. } => !self.is_hard_cancel(),
            _ => false,
        }
    }
}
