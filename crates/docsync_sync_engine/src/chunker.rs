//! Re-assembly of transactions split over several listener events.

use std::collections::HashMap;

use docsync_sync_protocol::MutationEvent;
use tracing::trace;

/// Output of the [`TransactionChunker`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkedEvent {
    /// The first part of a multi-part transaction arrived.
    PendingBegin {
        /// The transaction.
        transaction_id: String,
    },
    /// A mutation event, ready to apply.
    Mutation(MutationEvent),
    /// Every part of the transaction was delivered.
    PendingEnd {
        /// The transaction.
        transaction_id: String,
    },
}

/// Holds back the parts of a transaction until all of them arrived.
///
/// Single-part events pass straight through. For a transaction split into
/// `n` events the chunker emits `PendingBegin` on the first part and, once
/// the `n`th part arrives, every part in `transaction_current_event` order
/// followed by `PendingEnd`.
#[derive(Debug, Default)]
pub struct TransactionChunker {
    partial: HashMap<String, Vec<MutationEvent>>,
}

impl TransactionChunker {
    /// Creates an empty chunker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event.
    pub fn push(&mut self, event: MutationEvent) -> Vec<ChunkedEvent> {
        if !event.is_partial() {
            return vec![ChunkedEvent::Mutation(event)];
        }

        let transaction_id = event.transaction_id.clone();
        let total = event.transaction_total_events;
        let parts = self.partial.entry(transaction_id.clone()).or_default();
        let mut out = Vec::new();
        if parts.is_empty() {
            out.push(ChunkedEvent::PendingBegin {
                transaction_id: transaction_id.clone(),
            });
        }
        parts.push(event);
        trace!(txn = %transaction_id, received = parts.len(), total, "transaction part");

        if parts.len() >= total {
            let mut parts = self.partial.remove(&transaction_id).unwrap_or_default();
            parts.sort_by_key(|part| part.transaction_current_event);
            out.extend(parts.into_iter().map(ChunkedEvent::Mutation));
            out.push(ChunkedEvent::PendingEnd { transaction_id });
        }
        out
    }

    /// Number of transactions waiting for more parts.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Drops every incomplete transaction.
    pub fn reset(&mut self) {
        self.partial.clear();
    }
}
