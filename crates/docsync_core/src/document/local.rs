//! Local document: the unit a pair synchronizer drives.
//!
//! Wraps a [`BufferedDocument`] with a [`SquashingBuffer`] for uncommitted
//! edits and a queue of commits sent to the server one at a time.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use docsync_codec::Value;
use tracing::{debug, warn};

use crate::config::DocumentConfig;
use crate::document::buffered::{BufferedDocument, DocumentEvent, Submission};
use crate::document::squash::SquashingBuffer;
use crate::error::{CoreError, CoreResult};
use crate::mutation::Mutation;

/// Identifies a queued commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(u64);

impl CommitId {
    /// Raw sequence number.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commit-{}", self.0)
    }
}

/// A commit ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    /// Commit being attempted.
    pub commit_id: CommitId,
    /// Squashed mutation to submit.
    pub mutation: Mutation,
    /// Number of earlier failed attempts.
    pub attempt: u32,
}

/// Notifications produced by a [`LocalDocument`].
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    /// The local view changed.
    Mutation {
        /// The mutation applied.
        mutation: Mutation,
        /// Local view after it.
        document: Option<Value>,
        /// True for server mutations.
        remote: bool,
    },
    /// A server mutation reached HEAD.
    RemoteMutation(Mutation),
    /// The local view was recomputed and changed.
    Rebase {
        /// The new local view.
        document: Option<Value>,
        /// Server mutations behind the rebase.
        remote: Vec<Mutation>,
        /// Local mutations still pending.
        local: Vec<Mutation>,
    },
    /// Consistency flipped.
    ConsistencyChanged(bool),
    /// A commit was accepted by the server.
    Committed(CommitId),
    /// A commit was given up.
    CommitRejected {
        /// The rejected commit.
        commit_id: CommitId,
        /// Why it was rejected.
        reason: String,
    },
    /// The document was reset to a snapshot.
    Snapshot(Option<Value>),
    /// The document was deleted while local changes were queued.
    Deleted,
}

#[derive(Debug, Clone)]
struct QueuedCommit {
    id: CommitId,
    mutations: Vec<Mutation>,
    tries: u32,
}

impl QueuedCommit {
    /// Applies the commit leniently: a failing mutation is skipped.
    fn apply(&self, document: Option<Value>) -> Option<Value> {
        let mut current = document;
        for mutation in &self.mutations {
            match mutation.apply(current.as_ref()) {
                Ok(next) => current = next,
                Err(err) => warn!(commit = %self.id, error = %err, "queued mutation does not apply"),
            }
        }
        current
    }
}

#[derive(Debug)]
struct InFlight {
    commit: QueuedCommit,
    submission: Submission,
}

/// Local edits on top of a buffered document, with a serial commit queue.
#[derive(Debug)]
pub struct LocalDocument {
    document: BufferedDocument,
    buffer: SquashingBuffer,
    local: Option<Value>,
    commits: VecDeque<QueuedCommit>,
    in_flight: Option<InFlight>,
    next_commit_id: u64,
    consistent: bool,
    config: DocumentConfig,
    events: Vec<LocalEvent>,
}

impl LocalDocument {
    /// Creates a local document seeded with `document`.
    pub fn new(document: Option<Value>, config: DocumentConfig) -> Self {
        Self {
            document: BufferedDocument::with_config(document.clone(), config.clone()),
            buffer: SquashingBuffer::new(document.clone()),
            local: document,
            commits: VecDeque::new(),
            in_flight: None,
            next_commit_id: 0,
            consistent: true,
            config,
            events: Vec::new(),
        }
    }

    /// The local view: EDGE plus queued commits plus uncommitted edits.
    pub fn local(&self) -> Option<&Value> {
        self.local.as_ref()
    }

    /// Confirmed server state.
    pub fn head(&self) -> Option<&Value> {
        self.document.head()
    }

    /// Optimistic state including submitted commits.
    pub fn edge(&self) -> Option<&Value> {
        self.document.edge()
    }

    /// The wrapped buffered document.
    pub fn document(&self) -> &BufferedDocument {
        &self.document
    }

    /// True if edits are buffered or commits are queued.
    pub fn has_local_changes(&self) -> bool {
        !self.commits.is_empty() || self.buffer.has_changes()
    }

    /// Number of commits waiting to be sent.
    pub fn queued_commits(&self) -> usize {
        self.commits.len()
    }

    /// True if a commit is waiting for its outcome.
    pub fn has_commit_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// True when nothing is buffered, queued or unconfirmed.
    pub fn is_consistent(&self) -> bool {
        self.document.is_consistent() && !self.has_local_changes() && self.in_flight.is_none()
    }

    /// Takes every event emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<LocalEvent> {
        std::mem::take(&mut self.events)
    }

    /// Applies a local mutation to the local view and buffers it.
    ///
    /// # Errors
    ///
    /// Fails when the mutation does not apply to the local view.
    pub fn add(&mut self, mutation: Mutation) -> CoreResult<()> {
        let next = mutation.apply(self.local.as_ref())?;
        let mut buffer = self.buffer.clone();
        buffer.add(&mutation)?;
        self.buffer = buffer;
        self.set_consistent(false);
        debug!("buffered local mutation");

        let previous = std::mem::replace(&mut self.local, next);
        if previous != self.local {
            let deleted = self.local.is_none();
            self.events.push(LocalEvent::Mutation {
                mutation,
                document: self.local.clone(),
                remote: false,
            });
            if deleted {
                self.events.push(LocalEvent::Deleted);
            }
        }
        Ok(())
    }

    /// Feeds a server mutation to the buffered document.
    ///
    /// # Errors
    ///
    /// Rejects mutations whose previous and result revisions are equal and
    /// propagates buffered document errors.
    pub fn arrive(&mut self, mutation: Mutation) -> CoreResult<()> {
        debug!(
            previous = ?mutation.previous_rev,
            result = ?mutation.result_rev,
            "remote mutation arrived"
        );
        if mutation.previous_rev.is_some() && mutation.previous_rev == mutation.result_rev {
            return Err(CoreError::invalid_mutation(format!(
                "mutation {} has equal previous and result revisions",
                mutation.transaction_id().unwrap_or("<none>")
            )));
        }
        self.document.arrive(mutation)?;
        self.pump()
    }

    /// Resets HEAD to a snapshot and recomputes the local view on top of it.
    ///
    /// # Errors
    ///
    /// Fails when buffered edits do not apply to the snapshot.
    pub fn reset(&mut self, document: Option<Value>) -> CoreResult<()> {
        self.document.reset(document);
        self.pump()?;
        self.rebase(Vec::new(), Vec::new())?;
        let consistent = self.document.is_consistent();
        self.handle_consistency(consistent);
        self.events.push(LocalEvent::Snapshot(self.local.clone()));
        Ok(())
    }

    /// Moves the buffered edits into a queued commit.
    ///
    /// Returns `None` when nothing was buffered.
    ///
    /// # Errors
    ///
    /// Fails when flushing the buffer fails.
    pub fn commit(&mut self) -> CoreResult<Option<CommitId>> {
        if !self.buffer.has_changes() {
            return Ok(None);
        }
        let mutations: Vec<Mutation> = self.buffer.purge(None)?.into_iter().collect();
        let id = CommitId(self.next_commit_id);
        self.next_commit_id += 1;
        debug!(commit = %id, "queued commit");
        self.commits.push_back(QueuedCommit {
            id,
            mutations,
            tries: 0,
        });
        self.buffer = SquashingBuffer::new(self.local.clone());
        Ok(Some(id))
    }

    /// Hands out the next commit to submit, staging it on the buffered
    /// document. At most one commit is in flight.
    ///
    /// # Errors
    ///
    /// A commit that does not apply to EDGE is rejected and its error returned.
    pub fn next_commit(&mut self) -> CoreResult<Option<CommitRequest>> {
        if self.in_flight.is_some() {
            return Ok(None);
        }
        let Some(commit) = self.commits.pop_front() else {
            return Ok(None);
        };

        let mutation = Mutation::squash(&commit.mutations);
        let submission = match self.document.stage(mutation.clone(), true) {
            Ok(submission) => submission,
            Err(err) => {
                self.events.push(LocalEvent::CommitRejected {
                    commit_id: commit.id,
                    reason: err.to_string(),
                });
                self.pump()?;
                return Err(err);
            }
        };
        debug!(commit = %commit.id, txn = ?mutation.transaction_id(), "posting commit");
        let request = CommitRequest {
            commit_id: commit.id,
            mutation,
            attempt: commit.tries,
        };
        self.in_flight = Some(InFlight { commit, submission });
        self.pump()?;
        Ok(Some(request))
    }

    /// Records that the in-flight commit was accepted.
    ///
    /// # Errors
    ///
    /// Fails when no commit is in flight.
    pub fn commit_succeeded(&mut self) -> CoreResult<()> {
        let in_flight = self.take_in_flight()?;
        debug!(commit = %in_flight.commit.id, "commit succeeded");
        self.document.submission_succeeded(in_flight.submission);
        self.events.push(LocalEvent::Committed(in_flight.commit.id));
        self.pump()
    }

    /// Records a retryable failure of the in-flight commit.
    ///
    /// Returns the delay before the next attempt, or `None` when the commit
    /// was given up; giving up cancels the whole queue.
    ///
    /// # Errors
    ///
    /// Fails when no commit is in flight.
    pub fn commit_failed(&mut self) -> CoreResult<Option<Duration>> {
        let InFlight {
            mut commit,
            submission,
        } = self.take_in_flight()?;
        commit.tries += 1;
        debug!(commit = %commit.id, tries = commit.tries, "commit failed");

        let tries = commit.tries;
        if self.local.is_some() {
            self.commits.push_front(commit);
        } else {
            self.events.push(LocalEvent::CommitRejected {
                commit_id: commit.id,
                reason: "document was deleted".to_string(),
            });
        }
        self.document.submission_failed(submission);
        self.pump()?;

        if self.config.retry.allows_retry(tries) {
            return Ok(Some(self.config.retry.delay_for_attempt(tries)));
        }
        warn!(tries, "commit retries exhausted");
        self.cancel_all(&format!("gave up after {tries} attempts"))?;
        Ok(None)
    }

    /// Records a hard rejection: every queued commit is rejected and the
    /// document resets to HEAD, discarding uncommitted edits.
    ///
    /// # Errors
    ///
    /// Propagates failures of the reset.
    pub fn commit_cancelled(&mut self, reason: &str) -> CoreResult<()> {
        if let Some(in_flight) = self.in_flight.take() {
            self.events.push(LocalEvent::CommitRejected {
                commit_id: in_flight.commit.id,
                reason: reason.to_string(),
            });
        }
        self.cancel_all(reason)
    }

    fn cancel_all(&mut self, reason: &str) -> CoreResult<()> {
        warn!(reason, queued = self.commits.len(), "cancelling commit queue");
        for commit in self.commits.drain(..) {
            self.events.push(LocalEvent::CommitRejected {
                commit_id: commit.id,
                reason: reason.to_string(),
            });
        }
        let head = self.document.head().cloned();
        self.buffer = SquashingBuffer::new(head.clone());
        self.reset(head)
    }

    fn take_in_flight(&mut self) -> CoreResult<InFlight> {
        self.in_flight
            .take()
            .ok_or_else(|| CoreError::invalid_operation("no commit in flight"))
    }

    /// Dispatches events of the buffered document.
    fn pump(&mut self) -> CoreResult<()> {
        for event in self.document.drain_events() {
            match event {
                DocumentEvent::Mutation {
                    mutation,
                    document,
                    remote,
                } => self.handle_document_mutation(mutation, document, remote)?,
                DocumentEvent::RemoteMutation(mutation) => {
                    self.events.push(LocalEvent::RemoteMutation(mutation));
                }
                DocumentEvent::Rebase {
                    incoming, pending, ..
                } => self.rebase(incoming, pending)?,
                DocumentEvent::ConsistencyChanged(consistent) => {
                    self.handle_consistency(consistent);
                }
            }
        }
        Ok(())
    }

    fn handle_document_mutation(
        &mut self,
        mutation: Mutation,
        document: Option<Value>,
        remote: bool,
    ) -> CoreResult<()> {
        if !self.has_local_changes() {
            debug!("remote mutation without local changes");
            self.local = self.document.edge().cloned();
            self.buffer = SquashingBuffer::new(self.local.clone());
            self.events.push(LocalEvent::Mutation {
                mutation,
                document,
                remote,
            });
            return Ok(());
        }
        debug!("remote mutation with local changes");
        self.rebase(vec![mutation], Vec::new())
    }

    fn handle_deleted(&mut self) {
        debug!("document deleted");
        let had_local_changes = self.has_local_changes();
        for commit in self.commits.drain(..) {
            self.events.push(LocalEvent::CommitRejected {
                commit_id: commit.id,
                reason: "document was deleted".to_string(),
            });
        }
        self.buffer = SquashingBuffer::new(None);
        if had_local_changes {
            self.events.push(LocalEvent::Deleted);
        }
    }

    fn rebase(&mut self, remote: Vec<Mutation>, local: Vec<Mutation>) -> CoreResult<()> {
        if self.document.edge().is_none() {
            self.handle_deleted();
        }
        let base = self
            .commits
            .iter()
            .fold(self.document.edge().cloned(), |doc, commit| commit.apply(doc));
        let next = self.buffer.rebase(base)?;

        let changed = without_revision(&next) != without_revision(&self.local);
        self.local = next;
        if changed {
            debug!("local document rebased");
            self.events.push(LocalEvent::Rebase {
                document: self.local.clone(),
                remote,
                local,
            });
        }
        Ok(())
    }

    fn handle_consistency(&mut self, consistent: bool) {
        if !consistent {
            self.set_consistent(false);
        } else if !self.has_local_changes() && self.in_flight.is_none() {
            self.set_consistent(true);
        }
    }

    fn set_consistent(&mut self, consistent: bool) {
        if self.consistent != consistent {
            self.consistent = consistent;
            self.events.push(LocalEvent::ConsistencyChanged(consistent));
        }
    }
}

fn without_revision(document: &Option<Value>) -> Option<Value> {
    document.as_ref().map(|doc| doc.without_attribute("_rev"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::mutation::MutationOperation;
    use crate::patch::PatchPayload;
    use docsync_codec::from_json_str;

    fn json(text: &str) -> Value {
        from_json_str(text).unwrap()
    }

    fn set(path: &str, value: impl Into<Value>) -> Mutation {
        Mutation::new(vec![MutationOperation::patch(
            PatchPayload::new("d").with_set(path, value),
        )])
    }

    fn seeded() -> LocalDocument {
        LocalDocument::new(
            Some(json(r#"{"_id": "d", "_rev": "r0", "title": "hello"}"#)),
            DocumentConfig::default(),
        )
    }

    fn echo(request: &CommitRequest, previous: &str) -> Mutation {
        let txn = request.mutation.transaction_id().unwrap();
        let mut mutation = request.mutation.clone().with_previous_rev(previous);
        mutation.result_rev = Some(txn.to_string());
        mutation
    }

    #[test]
    fn edit_commit_and_echo_round_trip() {
        let mut doc = seeded();
        doc.add(set("title", "hello world")).unwrap();
        assert!(!doc.is_consistent());
        assert_eq!(doc.local().unwrap().get("title"), Some(&Value::from("hello world")));

        let id = doc.commit().unwrap().unwrap();
        let request = doc.next_commit().unwrap().unwrap();
        assert_eq!(request.commit_id, id);
        assert!(doc.next_commit().unwrap().is_none());

        doc.commit_succeeded().unwrap();
        doc.arrive(echo(&request, "r0")).unwrap();

        assert!(doc.is_consistent());
        assert_eq!(doc.head().unwrap().get("title"), Some(&Value::from("hello world")));
        let events = doc.drain_events();
        assert!(events.contains(&LocalEvent::Committed(id)));
        assert_eq!(events.last(), Some(&LocalEvent::ConsistencyChanged(true)));
    }

    #[test]
    fn rejected_edit_leaves_document_untouched() {
        let mut doc = seeded();
        doc.drain_events();
        let bad_inc = Mutation::new(vec![MutationOperation::patch(
            PatchPayload::new("d").with_inc("title", "one"),
        )]);

        assert!(doc.add(bad_inc).is_err());
        assert!(doc.is_consistent());
        assert!(!doc.has_local_changes());
        assert!(doc.drain_events().is_empty());
        assert_eq!(doc.local().unwrap().get("title"), Some(&Value::from("hello")));
        assert!(doc.commit().unwrap().is_none());
    }

    #[test]
    fn failed_commit_is_requeued_with_backoff() {
        let config = DocumentConfig::new().with_retry(RetryConfig::new(3).with_jitter(false));
        let mut doc = LocalDocument::new(Some(json(r#"{"_id": "d", "_rev": "r0"}"#)), config);
        doc.add(set("n", 1)).unwrap();
        doc.commit().unwrap();

        let first = doc.next_commit().unwrap().unwrap();
        assert_eq!(doc.commit_failed().unwrap(), Some(Duration::from_secs(1)));
        assert_eq!(doc.local().unwrap().get("n"), Some(&Value::Integer(1)));

        let second = doc.next_commit().unwrap().unwrap();
        assert_eq!(second.commit_id, first.commit_id);
        assert_eq!(second.attempt, 1);
        assert_ne!(second.mutation.transaction_id(), first.mutation.transaction_id());
    }

    #[test]
    fn exhausted_retries_cancel_the_queue() {
        let config = DocumentConfig::new().with_retry(RetryConfig::new(1));
        let mut doc = LocalDocument::new(Some(json(r#"{"_id": "d", "_rev": "r0"}"#)), config);
        doc.add(set("n", 1)).unwrap();
        let id = doc.commit().unwrap().unwrap();
        let _ = doc.next_commit().unwrap().unwrap();
        assert_eq!(doc.commit_failed().unwrap(), None);

        assert_eq!(doc.queued_commits(), 0);
        assert_eq!(doc.local().unwrap().get("n"), None);
        assert!(doc
            .drain_events()
            .iter()
            .any(|e| matches!(e, LocalEvent::CommitRejected { commit_id, .. } if *commit_id == id)));
    }

    #[test]
    fn cancellation_resets_to_head() {
        let mut doc = seeded();
        doc.add(set("title", "one")).unwrap();
        doc.commit().unwrap();
        doc.add(set("title", "two")).unwrap();
        doc.commit().unwrap();
        doc.add(set("title", "three")).unwrap();
        let _ = doc.next_commit().unwrap().unwrap();

        doc.commit_cancelled("409 conflict").unwrap();
        assert_eq!(doc.queued_commits(), 0);
        assert!(!doc.has_commit_in_flight());
        assert!(!doc.has_local_changes());
        assert_eq!(doc.local(), doc.head());
        assert!(doc.is_consistent());

        let rejected = doc
            .drain_events()
            .iter()
            .filter(|e| matches!(e, LocalEvent::CommitRejected { .. }))
            .count();
        assert_eq!(rejected, 2);
    }

    #[test]
    fn remote_edit_rebases_local_changes() {
        let mut doc = LocalDocument::new(
            Some(json(r#"{"_id": "d", "_rev": "r0", "a": 1, "b": 1}"#)),
            DocumentConfig::default(),
        );
        doc.add(set("a", 2)).unwrap();
        doc.drain_events();

        let remote = set("b", 5).with_previous_rev("r0").with_result_rev("r1").with_transaction_id("r1");
        doc.arrive(remote).unwrap();
        let local = doc.local().unwrap();
        assert_eq!(local.get("a"), Some(&Value::Integer(2)));
        assert_eq!(local.get("b"), Some(&Value::Integer(5)));
        assert!(doc
            .drain_events()
            .iter()
            .any(|e| matches!(e, LocalEvent::Rebase { .. })));
    }

    #[test]
    fn remote_edit_without_local_changes_is_a_plain_mutation() {
        let mut doc = seeded();
        let remote = set("title", "x").with_previous_rev("r0").with_result_rev("r1").with_transaction_id("r1");
        doc.arrive(remote).unwrap();
        assert_eq!(doc.local(), doc.head());
        assert!(doc
            .drain_events()
            .iter()
            .any(|e| matches!(e, LocalEvent::Mutation { remote: true, .. })));
    }

    #[test]
    fn equal_revisions_are_rejected() {
        let mut doc = seeded();
        let bad = set("a", 1).with_previous_rev("r0").with_result_rev("r0");
        assert!(matches!(
            doc.arrive(bad).unwrap_err(),
            CoreError::InvalidMutation { .. }
        ));
    }

    #[test]
    fn remote_delete_drops_queued_commits() {
        let mut doc = seeded();
        doc.add(set("title", "mine")).unwrap();
        doc.commit().unwrap();
        let delete = Mutation::new(vec![MutationOperation::delete("d")])
            .with_previous_rev("r0")
            .with_result_rev("r1")
            .with_transaction_id("r1");
        doc.arrive(delete).unwrap();
        assert!(doc.local().is_none());
        assert_eq!(doc.queued_commits(), 0);
        assert!(doc.drain_events().contains(&LocalEvent::Deleted));
    }
}
