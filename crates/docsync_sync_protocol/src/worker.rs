//! Messages between a pair synchronizer worker and its host.
//!
//! Commands flow in as `{"type": "draft.mutate", "payload": [...]}`;
//! events flow out as `{"type": "draft.events", "payload": {...}}`.

use docsync_codec::Value;
use docsync_core::{LocalEvent, Mutation, MutationOperation};
use serde::{Deserialize, Serialize};

use crate::id_pair::{DocumentVariant, IdPair};

/// Default API version used in request paths.
pub const DEFAULT_API_VERSION: &str = "2024-06-01";

/// How to reach the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL, e.g. `https://example.api.host`.
    pub base_url: String,
    /// Dataset the documents live in.
    pub dataset: String,
    /// API version, without the leading `v`.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl ClientConfig {
    /// Creates a config for `dataset` at `base_url`.
    pub fn new(base_url: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            dataset: dataset.into(),
            api_version: default_api_version(),
            token: None,
        }
    }

    /// Sets the API version.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// URL of a data endpoint, e.g. `mutate` or `actions`.
    pub fn data_url(&self, endpoint: &str) -> String {
        format!(
            "{}/v{}/data/{endpoint}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            self.dataset
        )
    }
}

/// Payload of the `construct` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructPayload {
    /// Store connection settings.
    pub client_config: ClientConfig,
    /// Documents to follow.
    pub id_pair: IdPair,
    /// Commit through the actions endpoint.
    #[serde(default)]
    pub server_actions_enabled: bool,
}

/// A command sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    /// Create the synchronizer instance.
    #[serde(rename = "construct")]
    Construct(ConstructPayload),
    /// Apply operations to the draft.
    #[serde(rename = "draft.mutate")]
    DraftMutate {
        /// Operations to apply.
        payload: Vec<MutationOperation>,
    },
    /// Commit buffered draft edits.
    #[serde(rename = "draft.commit")]
    DraftCommit,
    /// Apply operations to the published document.
    #[serde(rename = "published.mutate")]
    PublishedMutate {
        /// Operations to apply.
        payload: Vec<MutationOperation>,
    },
    /// Commit buffered published edits.
    #[serde(rename = "published.commit")]
    PublishedCommit,
    /// Tear the instance down.
    #[serde(rename = "dispose")]
    Dispose,
}

impl WorkerCommand {
    /// The `mutate` command for `variant`.
    pub fn mutate(variant: DocumentVariant, payload: Vec<MutationOperation>) -> Self {
        match variant {
            DocumentVariant::Draft => Self::DraftMutate { payload },
            DocumentVariant::Published => Self::PublishedMutate { payload },
        }
    }

    /// The `commit` command for `variant`.
    pub fn commit(variant: DocumentVariant) -> Self {
        match variant {
            DocumentVariant::Draft => Self::DraftCommit,
            DocumentVariant::Published => Self::PublishedCommit,
        }
    }

    /// Wire name of the command.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Construct(_) => "construct",
            Self::DraftMutate { .. } => "draft.mutate",
            Self::DraftCommit => "draft.commit",
            Self::PublishedMutate { .. } => "published.mutate",
            Self::PublishedCommit => "published.commit",
            Self::Dispose => "dispose",
        }
    }
}

/// Where a mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Made by this client.
    Local,
    /// Received from the server.
    Remote,
}

/// Boundary of a multi-part transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPhase {
    /// Parts of a transaction started arriving.
    Begin,
    /// The transaction is complete.
    End,
}

/// A document event as delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocumentEventPayload {
    /// The document was reset to a snapshot.
    Snapshot {
        /// The local view.
        document: Option<Value>,
    },
    /// The local view changed.
    Mutation {
        /// The local view after the change.
        document: Option<Value>,
        /// Operations applied.
        mutations: Vec<MutationOperation>,
        /// Who made them.
        origin: Origin,
    },
    /// The local view was recomputed on a new HEAD.
    Rebase {
        /// The new local view.
        document: Option<Value>,
        /// Server operations behind the rebase.
        #[serde(rename = "remoteMutations")]
        remote_mutations: Vec<MutationOperation>,
        /// Local operations still pending.
        #[serde(rename = "localMutations")]
        local_mutations: Vec<MutationOperation>,
    },
    /// A commit was accepted.
    Committed {
        /// Sequence number of the commit.
        #[serde(rename = "commitId")]
        commit_id: u64,
    },
    /// A commit was given up.
    CommitRejected {
        /// Sequence number of the commit.
        #[serde(rename = "commitId")]
        commit_id: u64,
        /// Why.
        reason: String,
    },
    /// The listener is reconnecting.
    Reconnect,
    /// A multi-part transaction started or finished.
    Pending {
        /// Which boundary.
        phase: PendingPhase,
    },
}

impl DocumentEventPayload {
    /// The host-facing form of a document event.
    ///
    /// Returns `None` for events the host learns about through other
    /// channels, such as consistency changes.
    pub fn from_local(event: LocalEvent) -> Option<Self> {
        Some(match event {
            LocalEvent::Mutation {
                mutation,
                document,
                remote,
            } => Self::Mutation {
                document,
                mutations: mutation.operations,
                origin: if remote { Origin::Remote } else { Origin::Local },
            },
            LocalEvent::Rebase {
                document,
                remote,
                local,
            } => Self::Rebase {
                document,
                remote_mutations: flatten(remote),
                local_mutations: flatten(local),
            },
            LocalEvent::Committed(id) => Self::Committed {
                commit_id: id.as_u64(),
            },
            LocalEvent::CommitRejected { commit_id, reason } => Self::CommitRejected {
                commit_id: commit_id.as_u64(),
                reason,
            },
            LocalEvent::Snapshot(document) => Self::Snapshot { document },
            LocalEvent::Deleted | LocalEvent::RemoteMutation(_) | LocalEvent::ConsistencyChanged(_) => {
                return None
            }
        })
    }
}

fn flatten(mutations: Vec<Mutation>) -> Vec<MutationOperation> {
    mutations.into_iter().flat_map(|m| m.operations).collect()
}

/// Error reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerError {
    /// Description of the failure.
    pub message: String,
}

/// An event sent from the worker to its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkerEvent {
    /// Draft document event.
    #[serde(rename = "draft.events")]
    DraftEvents(DocumentEventPayload),
    /// Published document event.
    #[serde(rename = "published.events")]
    PublishedEvents(DocumentEventPayload),
    /// Draft consistency flag.
    #[serde(rename = "draft.consistency$")]
    DraftConsistency(bool),
    /// Published consistency flag.
    #[serde(rename = "published.consistency$")]
    PublishedConsistency(bool),
    /// A command failed.
    #[serde(rename = "error")]
    Error(WorkerError),
}

impl WorkerEvent {
    /// A document event of `variant`.
    pub fn document(variant: DocumentVariant, payload: DocumentEventPayload) -> Self {
        match variant {
            DocumentVariant::Draft => Self::DraftEvents(payload),
            DocumentVariant::Published => Self::PublishedEvents(payload),
        }
    }

    /// A consistency flag of `variant`.
    pub fn consistency(variant: DocumentVariant, consistent: bool) -> Self {
        match variant {
            DocumentVariant::Draft => Self::DraftConsistency(consistent),
            DocumentVariant::Published => Self::PublishedConsistency(consistent),
        }
    }

    /// An error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(WorkerError {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::PatchPayload;

    #[test]
    fn construct_is_flat() {
        let json = r#"{
            "type": "construct",
            "clientConfig": {"baseUrl": "http://localhost", "dataset": "prod"},
            "idPair": {"draftId": "drafts.a", "publishedId": "a"},
            "serverActionsEnabled": true
        }"#;
        let command: WorkerCommand = serde_json::from_str(json).unwrap();
        let WorkerCommand::Construct(payload) = command else {
            panic!("expected construct");
        };
        assert!(payload.server_actions_enabled);
        assert_eq!(payload.client_config.api_version, DEFAULT_API_VERSION);
        assert_eq!(payload.id_pair, IdPair::from_published_id("a"));
    }

    #[test]
    fn mutate_and_commit_commands() {
        let command: WorkerCommand = serde_json::from_str(
            r#"{"type": "draft.mutate", "payload": [{"patch": {"id": "drafts.a", "set": {"n": 1}}}]}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            WorkerCommand::mutate(
                DocumentVariant::Draft,
                vec![MutationOperation::patch(
                    PatchPayload::new("drafts.a").with_set("n", 1)
                )]
            )
        );
        let commit: WorkerCommand =
            serde_json::from_str(r#"{"type": "published.commit"}"#).unwrap();
        assert_eq!(commit, WorkerCommand::commit(DocumentVariant::Published));
        assert_eq!(commit.kind(), "published.commit");
    }

    #[test]
    fn events_are_adjacently_tagged() {
        let json = serde_json::to_value(WorkerEvent::consistency(DocumentVariant::Draft, false))
            .unwrap();
        assert_eq!(json, serde_json::json!({"type": "draft.consistency$", "payload": false}));

        let json = serde_json::to_value(WorkerEvent::document(
            DocumentVariant::Published,
            DocumentEventPayload::Pending {
                phase: PendingPhase::Begin,
            },
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "published.events", "payload": {"type": "pending", "phase": "begin"}})
        );

        let json = serde_json::to_value(WorkerEvent::error("boom")).unwrap();
        assert_eq!(json["payload"]["message"], "boom");
    }

    #[test]
    fn data_urls() {
        let config = ClientConfig::new("https://store.test/", "prod").with_api_version("2021-06-07");
        assert_eq!(
            config.data_url("mutate"),
            "https://store.test/v2021-06-07/data/mutate/prod"
        );
    }

    #[test]
    fn consistency_events_are_not_document_events() {
        assert_eq!(
            DocumentEventPayload::from_local(LocalEvent::ConsistencyChanged(true)),
            None
        );
        assert_eq!(
            DocumentEventPayload::from_local(LocalEvent::Snapshot(None)),
            Some(DocumentEventPayload::Snapshot { document: None })
        );
    }
}
