//! A document tracked through confirmed (HEAD) and optimistic (EDGE) states.

use chrono::{DateTime, Utc};
use docsync_codec::Value;
use tracing::{debug, trace, warn};

use crate::config::DocumentConfig;
use crate::error::{CoreError, CoreResult};
use crate::mutation::Mutation;

/// Notifications produced by a [`BufferedDocument`], drained by the owner.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// EDGE moved along the expected path.
    Mutation {
        /// The mutation that moved it.
        mutation: Mutation,
        /// EDGE after the mutation.
        document: Option<Value>,
        /// True when the mutation came from the server.
        remote: bool,
    },
    /// A server mutation was applied to HEAD.
    RemoteMutation(Mutation),
    /// EDGE was recomputed and its content changed.
    Rebase {
        /// The new EDGE.
        document: Option<Value>,
        /// Server mutations that caused the rebase.
        incoming: Vec<Mutation>,
        /// Local mutations still pending.
        pending: Vec<Mutation>,
    },
    /// The consistency flag flipped.
    ConsistencyChanged(bool),
}

/// Proof that a mutation was staged; hand it back with the network outcome.
#[must_use = "a staged mutation must be resolved with submission_succeeded or submission_failed"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    transaction_id: String,
}

impl Submission {
    /// Transaction id of the staged mutation.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}

/// Reconciles server mutations (HEAD) with local optimistic edits (EDGE).
///
/// Invariant: EDGE is HEAD with `submitted` then `pending` applied.
#[derive(Debug, Clone)]
pub struct BufferedDocument {
    head: Option<Value>,
    edge: Option<Value>,
    incoming: Vec<Mutation>,
    submitted: Vec<Mutation>,
    pending: Vec<Mutation>,
    inconsistent_at: Option<DateTime<Utc>>,
    last_staged_at: Option<DateTime<Utc>>,
    config: DocumentConfig,
    events: Vec<DocumentEvent>,
}

impl BufferedDocument {
    /// Creates a document seeded with `document` and the default configuration.
    pub fn new(document: Option<Value>) -> Self {
        Self::with_config(document, DocumentConfig::default())
    }

    /// Creates a document seeded with `document`.
    pub fn with_config(document: Option<Value>, config: DocumentConfig) -> Self {
        Self {
            head: document.clone(),
            edge: document,
            incoming: Vec::new(),
            submitted: Vec::new(),
            pending: Vec::new(),
            inconsistent_at: None,
            last_staged_at: None,
            config,
            events: Vec::new(),
        }
    }

    /// Discards every queue and restarts from `document`.
    pub fn reset(&mut self, document: Option<Value>) {
        match document.as_ref().and_then(Value::revision) {
            Some(rev) => debug!(rev, "document reset"),
            None => debug!("document reset without revision"),
        }
        self.incoming.clear();
        self.submitted.clear();
        self.pending.clear();
        self.inconsistent_at = None;
        self.head = document.clone();
        self.edge = document;
        self.update_consistency();
    }

    /// Queues a server mutation and applies every incoming mutation that
    /// chains onto HEAD.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IncomingLoopExceeded`] when more mutations apply
    /// in one pass than the configured bound, and propagates failures of
    /// mutations that chain onto HEAD but cannot apply.
    pub fn arrive(&mut self, mutation: Mutation) -> CoreResult<()> {
        self.incoming.push(mutation);
        let result = self.consider_incoming();
        self.update_consistency();
        result
    }

    /// Applies a local mutation to EDGE and queues it as pending.
    ///
    /// With `silent` no [`DocumentEvent::Mutation`] is emitted.
    ///
    /// # Errors
    ///
    /// Fails when the mutation has no transaction id or does not apply to EDGE.
    pub fn stage(&mut self, mutation: Mutation, silent: bool) -> CoreResult<Submission> {
        let transaction_id = mutation
            .transaction_id()
            .ok_or(CoreError::MissingTransactionId)?
            .to_string();
        self.last_staged_at = Some(Utc::now());

        debug!(txn = %transaction_id, "staging mutation");
        self.edge = mutation.apply(self.edge.as_ref())?;
        if !silent {
            self.events.push(DocumentEvent::Mutation {
                mutation: mutation.clone(),
                document: self.edge.clone(),
                remote: false,
            });
        }
        self.pending.push(mutation);
        self.update_consistency();

        Ok(Submission { transaction_id })
    }

    /// Marks a staged mutation as accepted by the server.
    ///
    /// A mutation that was not next in line moves ahead of the ones before it
    /// and EDGE is rebased.
    pub fn submission_succeeded(&mut self, submission: Submission) {
        let txn = submission.transaction_id;
        match self.pending.iter().position(|m| m.transaction_id() == Some(txn.as_str())) {
            Some(0) => {
                let mutation = self.pending.remove(0);
                self.submitted.push(mutation);
            }
            Some(index) => {
                debug!(txn = %txn, "submission succeeded out of order");
                let mutation = self.pending.remove(index);
                self.submitted.push(mutation);
                self.rebase(Vec::new());
            }
            None => trace!(txn = %txn, "succeeded submission already arrived"),
        }
        self.update_consistency();
    }

    /// Drops a staged mutation the server rejected and rebases EDGE.
    pub fn submission_failed(&mut self, submission: Submission) {
        let txn = submission.transaction_id;
        debug!(txn = %txn, "submission failed");
        self.pending
            .retain(|m| m.transaction_id() != Some(txn.as_str()));
        self.rebase(Vec::new());
        self.update_consistency();
    }

    /// Confirmed document state.
    pub fn head(&self) -> Option<&Value> {
        self.head.as_ref()
    }

    /// Optimistic document state.
    pub fn edge(&self) -> Option<&Value> {
        self.edge.as_ref()
    }

    /// Server mutations waiting for their predecessor.
    pub fn incoming(&self) -> &[Mutation] {
        &self.incoming
    }

    /// Local mutations sent but not yet echoed.
    pub fn submitted(&self) -> &[Mutation] {
        &self.submitted
    }

    /// Local mutations staged but not yet acknowledged.
    pub fn pending(&self) -> &[Mutation] {
        &self.pending
    }

    /// True when nothing is queued anywhere.
    pub fn is_consistent(&self) -> bool {
        self.inconsistent_at.is_none()
    }

    /// When the document last became inconsistent.
    pub fn inconsistent_since(&self) -> Option<DateTime<Utc>> {
        self.inconsistent_at
    }

    /// When a local mutation was last staged.
    pub fn last_staged_at(&self) -> Option<DateTime<Utc>> {
        self.last_staged_at
    }

    /// True when the document has been inconsistent for longer than the
    /// grace period and nothing was staged within it.
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        let Ok(grace) = chrono::Duration::from_std(self.config.inconsistency_grace) else {
            return false;
        };
        let Some(since) = self.inconsistent_at else {
            return false;
        };
        let quiet = self
            .last_staged_at
            .map_or(true, |staged| now - staged > grace);
        now - since > grace && quiet
    }

    /// Takes every event emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }

    fn consider_incoming(&mut self) -> CoreResult<()> {
        self.drop_stale_incoming();

        let mut must_rebase = false;
        let mut rebase_mutations = Vec::new();
        let mut applied = 0usize;

        while let Some(index) = self.next_applicable() {
            applied += 1;
            if applied > self.config.max_incoming_iterations {
                return Err(CoreError::IncomingLoopExceeded {
                    limit: self.config.max_incoming_iterations,
                });
            }
            let mutation = self.incoming.remove(index);
            must_rebase |= self.apply_incoming(&mutation)?;
            if must_rebase {
                rebase_mutations.push(mutation);
            }
        }

        if !self.incoming.is_empty() {
            debug!(
                waiting = self.incoming.len(),
                "incoming mutations not applicable yet"
            );
        }
        if must_rebase {
            self.rebase(rebase_mutations);
        }
        Ok(())
    }

    /// Drops incoming mutations stamped before HEAD was last updated.
    fn drop_stale_incoming(&mut self) {
        let Some(updated_at) = self
            .head
            .as_ref()
            .and_then(|head| head.get("_updatedAt"))
            .and_then(Value::as_text)
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|ts| ts.with_timezone(&Utc))
        else {
            return;
        };
        let before = self.incoming.len();
        self.incoming
            .retain(|m| m.timestamp.map_or(true, |ts| ts >= updated_at));
        if self.incoming.len() != before {
            debug!(dropped = before - self.incoming.len(), "dropped stale incoming mutations");
        }
    }

    fn next_applicable(&self) -> Option<usize> {
        match &self.head {
            Some(head) => self
                .incoming
                .iter()
                .position(|m| m.previous_rev.as_deref() == head.revision()),
            None => self
                .incoming
                .iter()
                .position(Mutation::applies_to_missing_document),
        }
    }

    /// Applies a mutation known to chain onto HEAD. Returns true if EDGE
    /// must be rebased.
    fn apply_incoming(&mut self, mutation: &Mutation) -> CoreResult<bool> {
        trace!(
            previous = ?mutation.previous_rev,
            result = ?mutation.result_rev,
            "applying incoming mutation"
        );
        self.head = mutation.apply(self.head.as_ref())?;
        self.events
            .push(DocumentEvent::RemoteMutation(mutation.clone()));

        if self.has_unresolved() {
            let rebase = self.consume_unresolved(mutation.transaction_id());
            debug!(
                txn = ?mutation.transaction_id(),
                submitted = self.submitted.len(),
                pending = self.pending.len(),
                rebase,
                "incoming mutation met local mutations"
            );
            return Ok(rebase);
        }

        self.edge = self.head.clone();
        self.events.push(DocumentEvent::Mutation {
            mutation: mutation.clone(),
            document: self.edge.clone(),
            remote: true,
        });
        Ok(false)
    }

    fn has_unresolved(&self) -> bool {
        !self.submitted.is_empty() || !self.pending.is_empty()
    }

    /// Removes our own echoed mutation from the local queues. Returns true if
    /// it was not next in line, which means the predicted order was wrong.
    fn consume_unresolved(&mut self, txn: Option<&str>) -> bool {
        let Some(txn) = txn else {
            return true;
        };
        if let Some(first) = self.submitted.first() {
            if first.transaction_id() == Some(txn) {
                self.submitted.remove(0);
                return false;
            }
        } else if self
            .pending
            .first()
            .is_some_and(|first| first.transaction_id() == Some(txn))
        {
            self.pending.remove(0);
            return false;
        }
        self.submitted.retain(|m| m.transaction_id() != Some(txn));
        self.pending.retain(|m| m.transaction_id() != Some(txn));
        true
    }

    /// Recomputes EDGE from HEAD and the local queues.
    fn rebase(&mut self, incoming: Vec<Mutation>) {
        let mut edge = self.head.clone();
        for mutation in self.submitted.iter().chain(&self.pending) {
            match mutation.apply(edge.as_ref()) {
                Ok(next) => edge = next,
                Err(err) => warn!(
                    txn = ?mutation.transaction_id(),
                    error = %err,
                    "local mutation no longer applies, skipped in rebase"
                ),
            }
        }

        let changed = without_revision(&edge) != without_revision(&self.edge);
        self.edge = edge;
        if changed {
            debug!(pending = self.pending.len(), "edge rebased");
            self.events.push(DocumentEvent::Rebase {
                document: self.edge.clone(),
                incoming,
                pending: self.pending.clone(),
            });
        }
    }

    fn update_consistency(&mut self) {
        let was_consistent = self.is_consistent();
        let consistent =
            self.incoming.is_empty() && self.submitted.is_empty() && self.pending.is_empty();
        if consistent {
            self.inconsistent_at = None;
        } else if self.inconsistent_at.is_none() {
            self.inconsistent_at = Some(Utc::now());
        }
        if was_consistent != consistent {
            debug!(consistent, "consistency changed");
            self.events.push(DocumentEvent::ConsistencyChanged(consistent));
        }
    }
}

fn without_revision(document: &Option<Value>) -> Option<Value> {
    document.as_ref().map(|doc| doc.without_attribute("_rev"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationOperation;
    use crate::patch::PatchPayload;
    use docsync_codec::from_json_str;

    fn json(text: &str) -> Value {
        from_json_str(text).unwrap()
    }

    fn remote(prev: &str, next: &str, path: &str, value: impl Into<Value>) -> Mutation {
        Mutation::new(vec![MutationOperation::patch(
            PatchPayload::new("d").with_set(path, value),
        )])
        .with_previous_rev(prev)
        .with_result_rev(next)
        .with_transaction_id(next)
    }

    fn local(txn: &str, path: &str, value: impl Into<Value>) -> Mutation {
        Mutation::new(vec![MutationOperation::patch(
            PatchPayload::new("d").with_set(path, value),
        )])
        .with_transaction_id(txn)
    }

    fn seeded() -> BufferedDocument {
        BufferedDocument::new(Some(json(r#"{"_id": "d", "_rev": "r0", "title": "a"}"#)))
    }

    #[test]
    fn out_of_order_arrival_waits_for_predecessor() {
        let mut doc = seeded();
        doc.arrive(remote("r1", "r2", "title", "c")).unwrap();
        assert_eq!(doc.incoming().len(), 1);
        assert_eq!(doc.head().unwrap().revision(), Some("r0"));
        assert!(!doc.is_consistent());

        doc.arrive(remote("r0", "r1", "title", "b")).unwrap();
        assert!(doc.incoming().is_empty());
        assert_eq!(doc.head().unwrap().revision(), Some("r2"));
        assert_eq!(doc.head().unwrap().get("title"), Some(&Value::from("c")));
        assert_eq!(doc.edge(), doc.head());
        assert!(doc.is_consistent());

        let remote_count = doc
            .drain_events()
            .iter()
            .filter(|e| matches!(e, DocumentEvent::RemoteMutation(_)))
            .count();
        assert_eq!(remote_count, 2);
    }

    #[test]
    fn failed_submission_reverts_edge() {
        let mut doc = seeded();
        let first = doc.stage(local("t1", "title", "b"), false).unwrap();
        let _second = doc.stage(local("t2", "count", 1), false).unwrap();
        assert_eq!(doc.pending().len(), 2);

        doc.submission_failed(first);
        assert_eq!(doc.pending().len(), 1);
        let edge = doc.edge().unwrap();
        assert_eq!(edge.get("title"), Some(&Value::from("a")));
        assert_eq!(edge.get("count"), Some(&Value::Integer(1)));
        assert!(doc
            .drain_events()
            .iter()
            .any(|e| matches!(e, DocumentEvent::Rebase { .. })));
    }

    #[test]
    fn own_echo_is_consumed_without_rebase() {
        let mut doc = seeded();
        let submission = doc.stage(local("t1", "title", "b"), true).unwrap();
        doc.submission_succeeded(submission);
        assert_eq!(doc.submitted().len(), 1);
        doc.drain_events();

        doc.arrive(remote("r0", "t1", "title", "b")).unwrap();
        assert!(doc.submitted().is_empty());
        assert!(doc.is_consistent());
        let events = doc.drain_events();
        assert!(!events.iter().any(|e| matches!(e, DocumentEvent::Rebase { .. })));
        assert!(events.contains(&DocumentEvent::ConsistencyChanged(true)));
    }

    #[test]
    fn foreign_mutation_between_ours_rebases() {
        let mut doc = seeded();
        let submission = doc.stage(local("t1", "count", 1), false).unwrap();
        doc.submission_succeeded(submission);
        doc.drain_events();

        doc.arrive(remote("r0", "r1", "title", "x")).unwrap();
        assert_eq!(doc.submitted().len(), 1);
        let edge = doc.edge().unwrap();
        assert_eq!(edge.get("title"), Some(&Value::from("x")));
        assert_eq!(edge.get("count"), Some(&Value::Integer(1)));
        assert!(doc
            .drain_events()
            .iter()
            .any(|e| matches!(e, DocumentEvent::Rebase { .. })));
    }

    #[test]
    fn out_of_order_success_rebases() {
        let mut doc = seeded();
        let _first = doc.stage(local("t1", "a", 1), true).unwrap();
        let second = doc.stage(local("t2", "b", 2), true).unwrap();
        doc.submission_succeeded(second);
        assert_eq!(doc.submitted()[0].transaction_id(), Some("t2"));
        assert_eq!(doc.pending()[0].transaction_id(), Some("t1"));
    }

    #[test]
    fn stage_requires_transaction_id() {
        let mut doc = seeded();
        let err = doc
            .stage(Mutation::new(Vec::new()), false)
            .unwrap_err();
        assert_eq!(err, CoreError::MissingTransactionId);
        assert!(doc.is_consistent());
    }

    #[test]
    fn missing_document_admits_creation_only() {
        let mut doc = BufferedDocument::new(None);
        doc.arrive(remote("r0", "r1", "title", "x")).unwrap();
        assert!(doc.head().is_none());

        let create = Mutation::new(vec![MutationOperation::create(json(r#"{"_id": "d"}"#))])
            .with_result_rev("r0")
            .with_transaction_id("c");
        doc.arrive(create).unwrap();
        assert_eq!(doc.head().unwrap().get("title"), Some(&Value::from("x")));
        assert!(doc.incoming().is_empty());
    }

    #[test]
    fn stale_incoming_is_dropped() {
        let head = json(r#"{"_id": "d", "_rev": "r0", "_updatedAt": "2024-03-01T10:00:00Z"}"#);
        let mut doc = BufferedDocument::new(Some(head));
        let stale = remote("rx", "ry", "a", 1)
            .with_timestamp("2024-03-01T09:00:00Z".parse().unwrap());
        doc.arrive(stale).unwrap();
        assert!(doc.incoming().is_empty());
        assert!(doc.is_consistent());
    }

    #[test]
    fn loop_bound_is_enforced() {
        let config = DocumentConfig::new().with_max_incoming_iterations(2);
        let mut doc = BufferedDocument::with_config(
            Some(json(r#"{"_id": "d", "_rev": "r0"}"#)),
            config,
        );
        doc.arrive(remote("r1", "r2", "a", 1)).unwrap();
        doc.arrive(remote("r2", "r3", "a", 2)).unwrap();
        let err = doc.arrive(remote("r0", "r1", "a", 0)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn consistency_events_only_on_change() {
        let mut doc = seeded();
        let a = doc.stage(local("t1", "a", 1), true).unwrap();
        let b = doc.stage(local("t2", "b", 1), true).unwrap();
        doc.submission_failed(a);
        doc.submission_failed(b);
        let flips: Vec<_> = doc
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, DocumentEvent::ConsistencyChanged(_)))
            .collect();
        assert_eq!(
            flips,
            vec![
                DocumentEvent::ConsistencyChanged(false),
                DocumentEvent::ConsistencyChanged(true)
            ]
        );
        assert!(doc.inconsistent_since().is_none());
        assert!(doc.last_staged_at().is_some());
    }

    #[test]
    fn stalls_only_after_quiet_grace_period() {
        let config =
            DocumentConfig::new().with_inconsistency_grace(std::time::Duration::from_secs(10));
        let mut doc = BufferedDocument::with_config(
            Some(json(r#"{"_id": "d", "_rev": "r0", "title": "a"}"#)),
            config,
        );
        assert!(!doc.is_stalled(Utc::now() + chrono::Duration::hours(1)));

        let _ = doc.stage(local("t1", "title", "b"), true).unwrap();
        let since = doc.inconsistent_since().unwrap();
        let staged = doc.last_staged_at().unwrap();
        let latest = since.max(staged);
        let grace = chrono::Duration::seconds(10);

        assert!(!doc.is_stalled(latest));
        assert!(!doc.is_stalled(latest + grace));
        assert!(doc.is_stalled(latest + grace + chrono::Duration::milliseconds(1)));

        // A later edit restarts the quiet period.
        let _ = doc.stage(local("t2", "title", "c"), true).unwrap();
        let restaged = doc.last_staged_at().unwrap();
        assert!(!doc.is_stalled(restaged + grace));
        assert!(doc.is_stalled(restaged + grace + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn reset_discards_queues() {
        let mut doc = seeded();
        let _ = doc.stage(local("t1", "a", 1), true).unwrap();
        doc.reset(Some(json(r#"{"_id": "d", "_rev": "r5"}"#)));
        assert!(doc.pending().is_empty());
        assert!(doc.is_consistent());
        assert_eq!(doc.edge().unwrap().revision(), Some("r5"));
    }
}
