//! Configuration for the pair synchronizer.

use std::time::Duration;

use docsync_core::{DocumentConfig, RetryConfig};
use docsync_sync_protocol::{ClientConfig, ConstructPayload, IdPair};

/// Configuration of one pair synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Store connection settings.
    pub client: ClientConfig,
    /// Documents to follow.
    pub id_pair: IdPair,
    /// Commit through the actions endpoint unless the commit is a live edit.
    pub server_actions_enabled: bool,
    /// Request timeout.
    pub timeout: Duration,
    /// Settings of both local documents.
    pub document: DocumentConfig,
    /// Unmatched transactions the latency tracker remembers.
    pub latency_window: usize,
}

impl SyncConfig {
    /// Creates a configuration for `id_pair`.
    pub fn new(client: ClientConfig, id_pair: IdPair) -> Self {
        Self {
            client,
            id_pair,
            server_actions_enabled: false,
            timeout: Duration::from_secs(30),
            document: DocumentConfig::default(),
            latency_window: 64,
        }
    }

    /// Configuration from a worker `construct` command.
    pub fn from_construct(payload: &ConstructPayload) -> Self {
        Self::new(payload.client_config.clone(), payload.id_pair.clone())
            .with_server_actions(payload.server_actions_enabled)
    }

    /// Enables or disables the actions endpoint.
    #[must_use]
    pub fn with_server_actions(mut self, enabled: bool) -> Self {
        self.server_actions_enabled = enabled;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the document configuration.
    #[must_use]
    pub fn with_document_config(mut self, document: DocumentConfig) -> Self {
        self.document = document;
        self
    }

    /// Sets the commit retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.document = self.document.with_retry(retry);
        self
    }

    /// Sets the latency tracker window.
    #[must_use]
    pub fn with_latency_window(mut self, window: usize) -> Self {
        self.latency_window = window;
        self
    }
}
