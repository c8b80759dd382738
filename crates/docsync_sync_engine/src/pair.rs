//! The pair synchronizer: a draft and a published document kept in step
//! with the store through one listener and one commit pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use docsync_codec::Value;
use docsync_core::{CommitRequest, LocalDocument, LocalEvent, Mutation, MutationOperation};
use docsync_sync_protocol::{
    is_live_edit, to_actions, ActionRequest, DocumentVariant, ListenerEvent, MutateRequest,
    MutationEvent, PendingPhase,
};
use tracing::{debug, info, warn};

use crate::chunker::{ChunkedEvent, TransactionChunker};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::latency::{LatencyReport, LatencyTracker};
use crate::transport::DocumentTransport;

/// Something the host of a pair synchronizer should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum PairEvent {
    /// An event of one of the documents.
    Document {
        /// Which document.
        variant: DocumentVariant,
        /// The event.
        event: LocalEvent,
    },
    /// A multi-part transaction started or finished arriving.
    Pending(PendingPhase),
    /// The listener is reconnecting.
    Reconnect,
    /// The listener was closed by the server.
    Disconnected {
        /// Reason given by the server.
        reason: Option<String>,
    },
    /// A commit was seen on the listener.
    Latency(LatencyReport),
}

/// What [`PairSynchronizer::process_commits`] left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitProgress {
    /// Every queued commit was handled.
    Idle,
    /// A commit failed and should be retried after the delay.
    RetryAfter(Duration),
}

#[derive(Debug)]
struct Documents {
    draft: LocalDocument,
    published: LocalDocument,
}

impl Documents {
    fn get(&self, variant: DocumentVariant) -> &LocalDocument {
        match variant {
            DocumentVariant::Draft => &self.draft,
            DocumentVariant::Published => &self.published,
        }
    }

    fn get_mut(&mut self, variant: DocumentVariant) -> &mut LocalDocument {
        match variant {
            DocumentVariant::Draft => &mut self.draft,
            DocumentVariant::Published => &mut self.published,
        }
    }
}

/// Drives the draft and published halves of a document pair.
///
/// Listener events go in through [`handle_listener_event`], local edits
/// through [`mutate`] and [`commit`]. Commits of both documents share one
/// pipeline and are submitted one at a time by [`process_commits`]. Produced
/// events are collected until [`drain_events`].
///
/// [`handle_listener_event`]: PairSynchronizer::handle_listener_event
/// [`mutate`]: PairSynchronizer::mutate
/// [`commit`]: PairSynchronizer::commit
/// [`process_commits`]: PairSynchronizer::process_commits
/// [`drain_events`]: PairSynchronizer::drain_events
pub struct PairSynchronizer<T: DocumentTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    documents: Option<Documents>,
    chunker: TransactionChunker,
    latency: LatencyTracker,
    events: Vec<PairEvent>,
}

impl<T: DocumentTransport> PairSynchronizer<T> {
    /// Creates a synchronizer; documents load on the first `welcome`.
    pub fn new(config: SyncConfig, transport: Arc<T>) -> Self {
        let latency = LatencyTracker::new(config.latency_window);
        Self {
            config,
            transport,
            documents: None,
            chunker: TransactionChunker::new(),
            latency,
            events: Vec::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// True once both documents were loaded.
    pub fn is_ready(&self) -> bool {
        self.documents.is_some()
    }

    /// One of the documents, once loaded.
    pub fn document(&self, variant: DocumentVariant) -> Option<&LocalDocument> {
        self.documents.as_ref().map(|docs| docs.get(variant))
    }

    /// The local view of one document.
    pub fn local(&self, variant: DocumentVariant) -> Option<&Value> {
        self.document(variant).and_then(LocalDocument::local)
    }

    /// True when the document has nothing buffered, queued or unconfirmed.
    pub fn is_consistent(&self, variant: DocumentVariant) -> bool {
        self.document(variant).is_some_and(LocalDocument::is_consistent)
    }

    /// Takes every event produced since the last call.
    pub fn drain_events(&mut self) -> Vec<PairEvent> {
        std::mem::take(&mut self.events)
    }

    /// Handles one event of the listener stream.
    ///
    /// # Errors
    ///
    /// Fails when fetching snapshots fails or a mutation breaks a document.
    pub fn handle_listener_event(&mut self, event: ListenerEvent) -> SyncResult<()> {
        match event {
            ListenerEvent::Welcome(_) => self.load_snapshots(),
            ListenerEvent::Mutation(event) => {
                // Every part of a burst is applied and the bracket closed even
                // if one part fails; the first failure is reported afterwards.
                let mut first_error = None;
                for chunk in self.chunker.push(event) {
                    match chunk {
                        ChunkedEvent::PendingBegin { .. } => {
                            self.events.push(PairEvent::Pending(PendingPhase::Begin));
                        }
                        ChunkedEvent::Mutation(event) => {
                            if let Err(err) = self.apply_remote(event) {
                                warn!(error = %err, "remote mutation failed");
                                first_error.get_or_insert(err);
                            }
                        }
                        ChunkedEvent::PendingEnd { .. } => {
                            self.events.push(PairEvent::Pending(PendingPhase::End));
                        }
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
            ListenerEvent::Reconnect => {
                info!("listener reconnecting");
                self.chunker.reset();
                self.events.push(PairEvent::Reconnect);
                Ok(())
            }
            ListenerEvent::Disconnect(disconnect) => {
                warn!(reason = ?disconnect.reason, "listener disconnected");
                self.events.push(PairEvent::Disconnected {
                    reason: disconnect.reason,
                });
                Ok(())
            }
        }
    }

    /// Applies local operations to one document.
    ///
    /// # Errors
    ///
    /// Fails before the documents are loaded and when the operations do not
    /// apply to the local view.
    pub fn mutate(
        &mut self,
        variant: DocumentVariant,
        operations: Vec<MutationOperation>,
    ) -> SyncResult<()> {
        let documents = self.documents.as_mut().ok_or(SyncError::NotReady)?;
        let result = documents.get_mut(variant).add(Mutation::new(operations));
        self.collect(variant);
        Ok(result?)
    }

    /// Queues the buffered edits of one document as a commit.
    ///
    /// Returns false when there was nothing to commit.
    ///
    /// # Errors
    ///
    /// Fails before the documents are loaded.
    pub fn commit(&mut self, variant: DocumentVariant) -> SyncResult<bool> {
        let documents = self.documents.as_mut().ok_or(SyncError::NotReady)?;
        let result = documents.get_mut(variant).commit();
        self.collect(variant);
        Ok(result?.is_some())
    }

    /// Submits queued commits one at a time, draft first.
    ///
    /// Stops at the first retryable failure and returns its backoff delay.
    /// A status in the hard-cancel band cancels every commit of the
    /// originating document and resets it to HEAD.
    ///
    /// # Errors
    ///
    /// Fails before the documents are loaded or when a document breaks
    /// while handling an outcome.
    pub fn process_commits(&mut self) -> SyncResult<CommitProgress> {
        if self.documents.is_none() {
            return Err(SyncError::NotReady);
        }
        while let Some((variant, request)) = self.next_request()? {
            match self.submit(&request.mutation) {
                Ok(transaction_id) => {
                    debug!(%variant, txn = %transaction_id, "commit accepted");
                    if let Some(report) = self.latency.submitted(&transaction_id, Instant::now()) {
                        self.events.push(PairEvent::Latency(report));
                    }
                    self.with_document(variant, LocalDocument::commit_succeeded)?;
                }
                Err(err) if err.is_hard_cancel() || !err.is_retryable() => {
                    warn!(%variant, error = %err, "commit cancelled");
                    let reason = err.to_string();
                    self.with_document(variant, |doc| doc.commit_cancelled(&reason))?;
                }
                Err(err) => {
                    warn!(%variant, error = %err, attempt = request.attempt, "commit failed");
                    if let Some(delay) = self.with_document(variant, LocalDocument::commit_failed)? {
                        return Ok(CommitProgress::RetryAfter(delay));
                    }
                }
            }
        }
        Ok(CommitProgress::Idle)
    }

    /// Refetches every document that stayed inconsistent past
    /// [`DocumentConfig::inconsistency_grace`] without local activity, and
    /// resets it to the snapshot. Documents with a commit in flight are left
    /// alone. Returns the variants that were reset.
    ///
    /// [`DocumentConfig::inconsistency_grace`]: docsync_core::DocumentConfig::inconsistency_grace
    ///
    /// # Errors
    ///
    /// Fails when fetching the snapshots fails or buffered edits no longer
    /// apply to them.
    pub fn recover_stalled(&mut self, now: DateTime<Utc>) -> SyncResult<Vec<DocumentVariant>> {
        let Some(documents) = self.documents.as_ref() else {
            return Ok(Vec::new());
        };
        let stalled: Vec<DocumentVariant> = DocumentVariant::ALL
            .into_iter()
            .filter(|variant| {
                let document = documents.get(*variant);
                !document.has_commit_in_flight() && document.document().is_stalled(now)
            })
            .collect();
        if stalled.is_empty() {
            return Ok(stalled);
        }

        let ids: Vec<&str> = stalled
            .iter()
            .map(|variant| self.config.id_pair.id(*variant))
            .collect();
        let response = self.transport.fetch_documents(&ids)?;
        for variant in &stalled {
            let snapshot = response
                .document(self.config.id_pair.id(*variant))
                .cloned();
            warn!(%variant, "document stalled, reloading snapshot");
            self.with_document(*variant, |doc| doc.reset(snapshot))?;
        }
        Ok(stalled)
    }

    /// How often [`PairSynchronizer::recover_stalled`] is worth calling.
    pub fn stall_check_interval(&self) -> Duration {
        self.config.document.inconsistency_grace
    }

    fn next_request(&mut self) -> SyncResult<Option<(DocumentVariant, CommitRequest)>> {
        for variant in DocumentVariant::ALL {
            loop {
                let Some(documents) = self.documents.as_mut() else {
                    return Ok(None);
                };
                let document = documents.get_mut(variant);
                if document.has_commit_in_flight() || document.queued_commits() == 0 {
                    break;
                }
                let next = document.next_commit();
                self.collect(variant);
                match next {
                    Ok(Some(request)) => return Ok(Some((variant, request))),
                    Ok(None) => break,
                    Err(err) => warn!(%variant, error = %err, "commit rejected before submission"),
                }
            }
        }
        Ok(None)
    }

    fn submit(&self, mutation: &Mutation) -> SyncResult<String> {
        let pair = &self.config.id_pair;
        if self.config.server_actions_enabled && !is_live_edit(mutation, &pair.published_id) {
            let request = ActionRequest {
                actions: to_actions(pair, mutation)?,
                transaction_id: mutation.transaction_id.clone(),
            };
            debug!(actions = request.actions.len(), "submitting actions");
            return Ok(self.transport.action(&request)?.transaction_id);
        }
        let request = MutateRequest::from_mutation(mutation);
        debug!(operations = request.mutations.len(), "submitting mutations");
        Ok(self.transport.mutate(&request)?.transaction_id)
    }

    fn load_snapshots(&mut self) -> SyncResult<()> {
        let pair = self.config.id_pair.clone();
        let response = self.transport.fetch_documents(&pair.ids())?;
        let draft = response.document(&pair.draft_id).cloned();
        let published = response.document(&pair.published_id).cloned();
        debug!(
            draft = draft.is_some(),
            published = published.is_some(),
            "loaded snapshots"
        );

        self.chunker.reset();
        match self.documents.as_mut() {
            Some(documents) => {
                let draft_result = documents.draft.reset(draft);
                let published_result = documents.published.reset(published);
                self.collect(DocumentVariant::Draft);
                self.collect(DocumentVariant::Published);
                draft_result?;
                published_result?;
            }
            None => {
                let config = self.config.document.clone();
                self.documents = Some(Documents {
                    draft: LocalDocument::new(draft.clone(), config.clone()),
                    published: LocalDocument::new(published.clone(), config),
                });
                for (variant, snapshot) in [
                    (DocumentVariant::Draft, draft),
                    (DocumentVariant::Published, published),
                ] {
                    self.events.push(PairEvent::Document {
                        variant,
                        event: LocalEvent::Snapshot(snapshot),
                    });
                }
            }
        }
        Ok(())
    }

    fn apply_remote(&mut self, event: MutationEvent) -> SyncResult<()> {
        if let Some(report) = self.latency.received(&event.transaction_id, Instant::now()) {
            self.events.push(PairEvent::Latency(report));
        }
        let Some(variant) = self.config.id_pair.variant_of(&event.document_id) else {
            debug!(document = %event.document_id, "ignoring event for another document");
            return Ok(());
        };
        let Some(documents) = self.documents.as_mut() else {
            debug!("mutation before welcome");
            return Ok(());
        };
        let result = documents.get_mut(variant).arrive(event.to_mutation());
        self.collect(variant);
        Ok(result?)
    }

    fn with_document<R>(
        &mut self,
        variant: DocumentVariant,
        f: impl FnOnce(&mut LocalDocument) -> docsync_core::CoreResult<R>,
    ) -> SyncResult<R> {
        let documents = self.documents.as_mut().ok_or(SyncError::NotReady)?;
        let result = f(documents.get_mut(variant));
        self.collect(variant);
        Ok(result?)
    }

    fn collect(&mut self, variant: DocumentVariant) {
        if let Some(documents) = self.documents.as_mut() {
            self.events.extend(
                documents
                    .get_mut(variant)
                    .drain_events()
                    .into_iter()
                    .map(|event| PairEvent::Document { variant, event }),
            );
        }
    }
}
