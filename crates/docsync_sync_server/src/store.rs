//! In-memory revisioned document store with listener fan-out.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use docsync_codec::Value;
use docsync_core::{Mutation, MutationOperation, PatchPayload};
use docsync_sync_protocol::{
    Action, ActionRequest, ActionResponse, CreateAction, DisconnectEvent, DocumentsResponse,
    EditAction, IdPair, IfExists, ListenerEvent, MutateOutcome, MutateRequest, MutateResponse,
    MutateResult, MutationEvent, OmittedDocument, Transition, WelcomeEvent,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Reason given for ids missing from a fetch.
pub const OMITTED_EXISTENCE: &str = "existence";

struct Subscriber {
    ids: BTreeSet<String>,
    sender: broadcast::Sender<ListenerEvent>,
}

/// One document's part of a committed transaction.
struct Change {
    id: String,
    previous_rev: Option<String>,
    after: Option<Value>,
    operations: Vec<MutationOperation>,
    transition: Transition,
}

impl Change {
    fn outcome(&self) -> MutateOutcome {
        match self.transition {
            Transition::Appear => MutateOutcome::Create,
            Transition::Update => MutateOutcome::Update,
            Transition::Disappear => MutateOutcome::Delete,
        }
    }
}

/// Documents keyed by id.
///
/// Every transaction applies atomically: either every touched document
/// changes or none does. The transaction id becomes the `_rev` of every
/// document it wrote. Subscribers get one mutation event per touched
/// document they follow.
pub struct DocumentStore {
    config: ServerConfig,
    documents: RwLock<BTreeMap<String, Value>>,
    subscribers: Mutex<Vec<Subscriber>>,
    transactions: AtomicU64,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            documents: RwLock::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
            transactions: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Stores `document` as is, without a transaction or events.
    ///
    /// # Errors
    ///
    /// Fails when the document has no `_id`.
    pub fn seed(&self, document: Value) -> ServerResult<()> {
        let id = document
            .document_id()
            .ok_or_else(|| ServerError::invalid("document has no _id"))?
            .to_string();
        self.documents.write().insert(id, document);
        Ok(())
    }

    /// The current version of a document.
    pub fn document(&self, id: &str) -> Option<Value> {
        self.documents.read().get(id).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// True when no document is stored.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Number of committed transactions.
    pub fn transaction_count(&self) -> u64 {
        self.transactions.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.sender.receiver_count() > 0);
        subscribers.len()
    }

    /// Current versions of `ids`; missing ids are listed as omitted.
    pub fn fetch(&self, ids: &[&str]) -> DocumentsResponse {
        let documents = self.documents.read();
        let mut response = DocumentsResponse::default();
        for id in ids {
            match documents.get(*id) {
                Some(document) => response.documents.push(document.clone()),
                None => response.omitted.push(OmittedDocument {
                    id: (*id).to_string(),
                    reason: OMITTED_EXISTENCE.to_string(),
                }),
            }
        }
        response
    }

    /// Applies raw mutations as one transaction.
    ///
    /// # Errors
    ///
    /// Fails without changing anything when an operation does not apply.
    pub fn mutate(&self, request: MutateRequest) -> ServerResult<MutateResponse> {
        let operations = request.mutations;
        let (transaction_id, results) =
            self.commit(request.transaction_id, move |_| Ok(operations))?;
        Ok(MutateResponse {
            transaction_id,
            results,
        })
    }

    /// Runs document actions as one transaction.
    ///
    /// `create` makes the document named by the attributes' `_id`; `edit`
    /// patches the draft, copying it from the published document first when
    /// there is no draft yet.
    ///
    /// # Errors
    ///
    /// Fails without changing anything when an action does not apply.
    pub fn action(&self, request: ActionRequest) -> ServerResult<ActionResponse> {
        let actions = request.actions;
        let (transaction_id, _) = self.commit(request.transaction_id, move |documents| {
            action_operations(documents, actions)
        })?;
        Ok(ActionResponse { transaction_id })
    }

    /// Opens a listener for `ids`.
    ///
    /// The first event on the returned receiver is always `welcome`.
    pub fn subscribe(&self, ids: &[&str]) -> broadcast::Receiver<ListenerEvent> {
        let (sender, receiver) = broadcast::channel(self.config.channel_capacity);
        let welcome = ListenerEvent::Welcome(WelcomeEvent {
            listener_name: Some(Uuid::new_v4().to_string()),
        });
        if sender.send(welcome).is_err() {
            trace!("listener dropped before welcome");
        }
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.sender.receiver_count() > 0);
        subscribers.push(Subscriber {
            ids: ids.iter().map(|id| (*id).to_string()).collect(),
            sender,
        });
        debug!(?ids, subscribers = subscribers.len(), "listener opened");
        receiver
    }

    /// Tells every listener to reconnect.
    pub fn broadcast_reconnect(&self) {
        self.broadcast(&ListenerEvent::Reconnect);
    }

    /// Closes every listener.
    pub fn disconnect_all(&self, reason: impl Into<String>) {
        self.broadcast(&ListenerEvent::Disconnect(DisconnectEvent {
            reason: Some(reason.into()),
        }));
        self.subscribers.lock().clear();
    }

    fn broadcast(&self, event: &ListenerEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.sender.send(event.clone()).is_ok());
    }

    fn commit<F>(
        &self,
        requested: Option<String>,
        build: F,
    ) -> ServerResult<(String, Vec<MutateResult>)>
    where
        F: FnOnce(&BTreeMap<String, Value>) -> ServerResult<Vec<MutationOperation>>,
    {
        let mut documents = self.documents.write();
        let operations = build(&documents)?;
        if operations.is_empty() {
            return Err(ServerError::invalid("transaction has no mutations"));
        }
        if operations.len() > self.config.max_mutations_per_request {
            return Err(ServerError::invalid(format!(
                "too many mutations: {} > {}",
                operations.len(),
                self.config.max_mutations_per_request
            )));
        }
        if operations.iter().any(|op| op.document_id().is_none()) {
            return Err(ServerError::invalid("query patches are not supported"));
        }

        let transaction_id = match requested {
            Some(id) if self.config.honor_client_transaction_ids && !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        let timestamp = Utc::now();
        let mutation = Mutation::new(operations)
            .with_transaction_id(transaction_id.as_str())
            .with_result_rev(transaction_id.as_str())
            .with_timestamp(timestamp);

        let mut changes = Vec::new();
        for id in mutation.document_ids() {
            let scoped = mutation.for_document(&id);
            let before = documents.get(&id);
            if let Some(change) = stage(&id, before, scoped)? {
                changes.push(change);
            }
        }

        for change in &changes {
            match &change.after {
                Some(document) => documents.insert(change.id.clone(), document.clone()),
                None => documents.remove(&change.id),
            };
        }
        self.transactions.fetch_add(1, Ordering::SeqCst);
        debug!(txn = %transaction_id, documents = changes.len(), "committed transaction");

        self.publish(&transaction_id, timestamp, &changes);
        let results = changes
            .iter()
            .map(|change| MutateResult {
                id: change.id.clone(),
                operation: change.outcome(),
            })
            .collect();
        Ok((transaction_id, results))
    }

    fn publish(&self, transaction_id: &str, timestamp: DateTime<Utc>, changes: &[Change]) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            let relevant: Vec<&Change> = changes
                .iter()
                .filter(|change| subscriber.ids.contains(&change.id))
                .collect();
            let total = relevant.len();
            relevant.into_iter().enumerate().all(|(index, change)| {
                let event = MutationEvent::new(
                    change.id.as_str(),
                    transaction_id,
                    change.operations.clone(),
                )
                .with_revisions(change.previous_rev.clone(), Some(transaction_id.to_string()))
                .with_transition(change.transition)
                .with_timestamp(timestamp)
                .with_part(index + 1, total);
                subscriber.sender.send(ListenerEvent::Mutation(event)).is_ok()
            })
        });
    }
}

fn stage(id: &str, before: Option<&Value>, mutation: Mutation) -> ServerResult<Option<Change>> {
    if before.is_some() {
        if let Some(MutationOperation::Create(_)) = mutation.operations.first() {
            return Err(ServerError::conflict(format!("document {id} already exists")));
        }
    }
    let after = mutation.apply(before)?;
    let transition = match (before, &after) {
        (None, None) => {
            let only_deletes = mutation
                .operations
                .iter()
                .all(|op| matches!(op, MutationOperation::Delete(_)));
            if only_deletes {
                trace!(id, "delete of missing document");
                return Ok(None);
            }
            warn!(id, "mutation of missing document");
            return Err(ServerError::conflict(format!("document {id} not found")));
        }
        (None, Some(_)) => Transition::Appear,
        (Some(_), None) => Transition::Disappear,
        (Some(_), Some(_)) => Transition::Update,
    };
    Ok(Some(Change {
        id: id.to_string(),
        previous_rev: before.and_then(Value::revision).map(str::to_string),
        after,
        operations: mutation.operations,
        transition,
    }))
}

fn action_operations(
    documents: &BTreeMap<String, Value>,
    actions: Vec<Action>,
) -> ServerResult<Vec<MutationOperation>> {
    let mut created = BTreeSet::new();
    let mut operations = Vec::new();
    for action in actions {
        match action {
            Action::Create(CreateAction {
                published_id,
                attributes,
                if_exists,
            }) => {
                let id = attributes
                    .document_id()
                    .ok_or_else(|| ServerError::invalid("create action attributes need an _id"))?
                    .to_string();
                if IdPair::from_published_id(published_id.as_str())
                    .variant_of(&id)
                    .is_none()
                {
                    return Err(ServerError::invalid(format!(
                        "{id} does not belong to {published_id}"
                    )));
                }
                if documents.contains_key(&id) || created.contains(&id) {
                    match if_exists {
                        IfExists::Fail => {
                            return Err(ServerError::conflict(format!(
                                "document {id} already exists"
                            )))
                        }
                        IfExists::Ignore => continue,
                    }
                }
                created.insert(id);
                operations.push(MutationOperation::create(attributes));
            }
            Action::Edit(EditAction {
                draft_id,
                published_id,
                patch,
            }) => {
                if !documents.contains_key(&draft_id) && !created.contains(&draft_id) {
                    let published = documents.get(&published_id).ok_or_else(|| {
                        ServerError::conflict(format!("document {published_id} not found"))
                    })?;
                    operations.push(MutationOperation::create_if_not_exists(
                        published.with_attribute("_id", Value::from(draft_id.as_str())),
                    ));
                    created.insert(draft_id.clone());
                }
                operations.push(MutationOperation::patch(PatchPayload {
                    id: Some(draft_id),
                    ..patch
                }));
            }
        }
    }
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_codec::from_json_str;
    use docsync_sync_protocol::EMPTY_ACTION_GUARD_FIELD;

    fn json(text: &str) -> Value {
        from_json_str(text).unwrap()
    }

    fn store() -> DocumentStore {
        let store = DocumentStore::new(ServerConfig::default());
        store
            .seed(json(r#"{"_id": "post", "_rev": "r0", "title": "hello", "views": 1}"#))
            .unwrap();
        store
    }

    fn mutate(ops: Vec<MutationOperation>, txn: &str) -> MutateRequest {
        MutateRequest {
            mutations: ops,
            transaction_id: Some(txn.to_string()),
        }
    }

    #[test]
    fn fetch_reports_missing() {
        let store = store();
        let response = store.fetch(&["drafts.post", "post"]);
        assert_eq!(response.documents.len(), 1);
        assert_eq!(response.omitted[0].id, "drafts.post");
        assert_eq!(response.omitted[0].reason, OMITTED_EXISTENCE);
    }

    #[test]
    fn mutate_sets_revision_to_transaction() {
        let store = store();
        let response = store
            .mutate(mutate(
                vec![MutationOperation::patch(
                    PatchPayload::new("post").with_inc("views", 2),
                )],
                "tx1",
            ))
            .unwrap();
        assert_eq!(response.transaction_id, "tx1");
        assert_eq!(response.results[0].operation, MutateOutcome::Update);

        let doc = store.document("post").unwrap();
        assert_eq!(doc.revision(), Some("tx1"));
        assert_eq!(doc.get("views"), Some(&Value::from(3)));
        assert!(doc.get("_updatedAt").is_some());
    }

    #[test]
    fn generated_transaction_ids() {
        let store = DocumentStore::new(ServerConfig::default().with_client_transaction_ids(false));
        let response = store
            .mutate(mutate(
                vec![MutationOperation::create(json(r#"{"_id": "a"}"#))],
                "mine",
            ))
            .unwrap();
        assert_ne!(response.transaction_id, "mine");
        assert_eq!(
            store.document("a").unwrap().revision(),
            Some(response.transaction_id.as_str())
        );
    }

    #[test]
    fn failed_transaction_changes_nothing() {
        let store = store();
        let err = store
            .mutate(mutate(
                vec![
                    MutationOperation::create(json(r#"{"_id": "fresh"}"#)),
                    MutationOperation::create(json(r#"{"_id": "post"}"#)),
                ],
                "tx1",
            ))
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert!(store.document("fresh").is_none());
        assert_eq!(store.transaction_count(), 0);
    }

    #[test]
    fn patch_of_missing_document_conflicts() {
        let store = store();
        let err = store
            .mutate(mutate(
                vec![MutationOperation::patch(
                    PatchPayload::new("ghost").with_set("a", 1),
                )],
                "tx1",
            ))
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn request_limits() {
        let store = DocumentStore::new(ServerConfig::default().with_max_mutations_per_request(1));
        let err = store
            .mutate(mutate(
                vec![MutationOperation::delete("a"), MutationOperation::delete("b")],
                "tx1",
            ))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(store.mutate(mutate(Vec::new(), "tx2")).unwrap_err().status_code(), 400);
    }

    #[test]
    fn edit_action_copies_published_into_draft() {
        let store = store();
        let pair = IdPair::from_published_id("post");
        store
            .action(ActionRequest {
                actions: vec![Action::Edit(EditAction {
                    draft_id: pair.draft_id.clone(),
                    published_id: pair.published_id.clone(),
                    patch: PatchPayload::default().with_set("title", "draft title"),
                })],
                transaction_id: Some("tx1".into()),
            })
            .unwrap();

        let draft = store.document("drafts.post").unwrap();
        assert_eq!(draft.get("title"), Some(&Value::from("draft title")));
        assert_eq!(draft.get("views"), Some(&Value::from(1)));
        assert_eq!(draft.revision(), Some("tx1"));
        assert_eq!(
            store.document("post").unwrap().get("title"),
            Some(&Value::from("hello"))
        );
    }

    #[test]
    fn guard_edit_runs_a_transaction() {
        let store = store();
        let pair = IdPair::from_published_id("post");
        store
            .action(ActionRequest {
                actions: vec![Action::Edit(EditAction {
                    draft_id: pair.draft_id.clone(),
                    published_id: pair.published_id.clone(),
                    patch: PatchPayload::default().with_unset(EMPTY_ACTION_GUARD_FIELD),
                })],
                transaction_id: None,
            })
            .unwrap();
        assert_eq!(store.transaction_count(), 1);
    }

    #[test]
    fn create_action_respects_if_exists() {
        let store = store();
        let create = |if_exists| {
            Action::Create(CreateAction {
                published_id: "post".into(),
                attributes: json(r#"{"_id": "post", "title": "again"}"#),
                if_exists,
            })
        };
        let err = store
            .action(ActionRequest {
                actions: vec![create(IfExists::Fail)],
                transaction_id: None,
            })
            .unwrap_err();
        assert_eq!(err.status_code(), 409);

        let err = store
            .action(ActionRequest {
                actions: vec![create(IfExists::Ignore)],
                transaction_id: None,
            })
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn subscribers_get_welcome_then_their_parts() {
        let store = store();
        store.seed(json(r#"{"_id": "other", "_rev": "o0"}"#)).unwrap();
        let mut pair = store.subscribe(&["drafts.post", "post"]);
        let mut other = store.subscribe(&["other"]);

        store
            .mutate(mutate(
                vec![
                    MutationOperation::create(json(r#"{"_id": "drafts.post", "title": "d"}"#)),
                    MutationOperation::patch(PatchPayload::new("post").with_set("title", "p")),
                    MutationOperation::delete("other"),
                ],
                "tx1",
            ))
            .unwrap();

        assert!(matches!(pair.try_recv().unwrap(), ListenerEvent::Welcome(_)));
        let ListenerEvent::Mutation(first) = pair.try_recv().unwrap() else {
            panic!("expected a mutation event");
        };
        let ListenerEvent::Mutation(second) = pair.try_recv().unwrap() else {
            panic!("expected a mutation event");
        };
        assert_eq!(first.document_id, "drafts.post");
        assert_eq!(first.transition, Transition::Appear);
        assert_eq!(first.previous_rev, None);
        assert_eq!((first.transaction_current_event, first.transaction_total_events), (1, 2));
        assert_eq!(second.document_id, "post");
        assert_eq!(second.previous_rev.as_deref(), Some("r0"));
        assert_eq!(second.result_rev.as_deref(), Some("tx1"));
        assert!(pair.try_recv().is_err());

        assert!(matches!(other.try_recv().unwrap(), ListenerEvent::Welcome(_)));
        let ListenerEvent::Mutation(deleted) = other.try_recv().unwrap() else {
            panic!("expected a mutation event");
        };
        assert_eq!(deleted.transition, Transition::Disappear);
        assert_eq!(deleted.transaction_total_events, 1);
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let store = store();
        let receiver = store.subscribe(&["post"]);
        assert_eq!(store.subscriber_count(), 1);
        drop(receiver);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn disconnect_reaches_listeners() {
        let store = store();
        let mut receiver = store.subscribe(&["post"]);
        store.disconnect_all("shutting down");
        receiver.try_recv().unwrap();
        assert_eq!(
            receiver.try_recv().unwrap(),
            ListenerEvent::Disconnect(DisconnectEvent {
                reason: Some("shutting down".into())
            })
        );
    }
}
