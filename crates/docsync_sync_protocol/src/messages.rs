//! Request and response bodies of the document endpoints.

use docsync_codec::Value;
use docsync_core::{Mutation, MutationOperation, PatchPayload};
use serde::{Deserialize, Serialize};

/// Body of `POST /data/mutate/{dataset}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutateRequest {
    /// Operations to apply atomically.
    pub mutations: Vec<MutationOperation>,
    /// Transaction id the server should use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl MutateRequest {
    /// Request body for a local mutation. Revision metadata stays local.
    pub fn from_mutation(mutation: &Mutation) -> Self {
        Self {
            mutations: mutation.operations.clone(),
            transaction_id: mutation.transaction_id.clone(),
        }
    }

    /// The operations as a mutation.
    pub fn to_mutation(&self) -> Mutation {
        Mutation {
            operations: self.mutations.clone(),
            transaction_id: self.transaction_id.clone(),
            ..Mutation::default()
        }
    }
}

/// What a mutate request did to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutateOutcome {
    /// The document was created.
    Create,
    /// The document was changed.
    Update,
    /// The document was deleted.
    Delete,
}

/// Per-document result of a mutate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutateResult {
    /// Document id.
    pub id: String,
    /// What happened to it.
    pub operation: MutateOutcome,
}

/// Response to a mutate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutateResponse {
    /// Id of the committed transaction.
    pub transaction_id: String,
    /// Documents the transaction touched.
    #[serde(default)]
    pub results: Vec<MutateResult>,
}

/// Behaviour of a create action when the document already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Reject the action.
    #[default]
    Fail,
    /// Leave the existing document.
    Ignore,
}

/// Creates the draft of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAction {
    /// Published id of the pair.
    pub published_id: String,
    /// Initial document, including its `_id`.
    pub attributes: Value,
    /// What to do when the document exists.
    #[serde(default)]
    pub if_exists: IfExists,
}

/// Patches the draft of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAction {
    /// Draft id of the pair.
    pub draft_id: String,
    /// Published id of the pair.
    pub published_id: String,
    /// The patch, without a target id.
    pub patch: PatchPayload,
}

/// A document action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actionType")]
pub enum Action {
    /// `sanity.action.document.create`
    #[serde(rename = "sanity.action.document.create")]
    Create(CreateAction),
    /// `sanity.action.document.edit`
    #[serde(rename = "sanity.action.document.edit")]
    Edit(EditAction),
}

/// Body of `POST /data/actions/{dataset}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Actions to run in one transaction.
    pub actions: Vec<Action>,
    /// Transaction id the server should use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Response to an action request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    /// Id of the committed transaction.
    pub transaction_id: String,
}

/// Why a requested document was left out of a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmittedDocument {
    /// Document id.
    pub id: String,
    /// `existence` or `permission`.
    pub reason: String,
}

/// Response of `GET /data/doc/{dataset}/{ids}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentsResponse {
    /// Documents that exist.
    pub documents: Vec<Value>,
    /// Requested ids that were not returned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omitted: Vec<OmittedDocument>,
}

impl DocumentsResponse {
    /// The document with id `id`, if returned.
    pub fn document(&self, id: &str) -> Option<&Value> {
        self.documents.iter().find(|doc| doc.document_id() == Some(id))
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Short error name.
    pub error: String,
    /// Human readable description.
    pub message: String,
}
