//! Commit round-trip latency.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Time between submitting a transaction and seeing it on the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyReport {
    /// The transaction.
    pub transaction_id: String,
    /// Submit to receive.
    pub latency: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Submit,
    Receive,
}

/// Pairs submitted and received transaction ids.
///
/// Either side may come first. Unmatched entries are kept up to a window;
/// the oldest are forgotten beyond it.
#[derive(Debug)]
pub struct LatencyTracker {
    pending: VecDeque<(Side, String, Instant)>,
    window: usize,
}

impl LatencyTracker {
    /// Creates a tracker remembering up to `window` unmatched entries.
    pub fn new(window: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            window: window.max(1),
        }
    }

    /// Records that `transaction_id` was submitted at `at`.
    pub fn submitted(&mut self, transaction_id: &str, at: Instant) -> Option<LatencyReport> {
        self.record(Side::Submit, transaction_id, at)
    }

    /// Records that `transaction_id` was received at `at`.
    pub fn received(&mut self, transaction_id: &str, at: Instant) -> Option<LatencyReport> {
        self.record(Side::Receive, transaction_id, at)
    }

    /// Number of unmatched entries.
    pub fn unmatched(&self) -> usize {
        self.pending.len()
    }

    fn record(&mut self, side: Side, transaction_id: &str, at: Instant) -> Option<LatencyReport> {
        let matching = self
            .pending
            .iter()
            .position(|(s, id, _)| *s != side && id == transaction_id);
        if let Some(index) = matching {
            let (_, _, earlier) = self.pending.remove(index)?;
            let (submitted, received) = match side {
                Side::Receive => (earlier, at),
                Side::Submit => (at, earlier),
            };
            return Some(LatencyReport {
                transaction_id: transaction_id.to_string(),
                latency: received.saturating_duration_since(submitted),
            });
        }

        self.pending.push_back((side, transaction_id.to_string(), at));
        while self.pending.len() > self.window {
            self.pending.pop_front();
        }
        None
    }
}
