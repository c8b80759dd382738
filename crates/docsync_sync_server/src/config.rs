//! Server configuration.

/// Configuration for the reference store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Dataset served under `/data/*/{dataset}`.
    pub dataset: String,
    /// Maximum operations or actions in one request.
    pub max_mutations_per_request: usize,
    /// Buffered listener events per subscriber.
    pub channel_capacity: usize,
    /// Use the transaction id a client sends instead of generating one.
    pub honor_client_transaction_ids: bool,
}

impl ServerConfig {
    /// Creates a configuration serving `dataset`.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            max_mutations_per_request: 1000,
            channel_capacity: 256,
            honor_client_transaction_ids: true,
        }
    }

    /// Sets the request size limit.
    #[must_use]
    pub fn with_max_mutations_per_request(mut self, max: usize) -> Self {
        self.max_mutations_per_request = max;
        self
    }

    /// Sets the subscriber channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Chooses whether client transaction ids become revisions.
    #[must_use]
    pub fn with_client_transaction_ids(mut self, honor: bool) -> Self {
        self.honor_client_transaction_ids = honor;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("production")
    }
}
