//! Mutations: revision-chained batches of document operations.

use chrono::{DateTime, SecondsFormat, Utc};
use docsync_codec::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::patch::{CompiledPatch, PatchPayload};

/// Target of a `delete` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTarget {
    /// Document id.
    pub id: String,
}

/// One operation of a mutation, in wire form (`{"create": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationOperation {
    /// Create the document; no effect if it exists.
    Create(Value),
    /// Create the document unless it exists.
    CreateIfNotExists(Value),
    /// Create or fully replace the document.
    CreateOrReplace(Value),
    /// Delete the document.
    Delete(DeleteTarget),
    /// Patch the document.
    Patch(PatchPayload),
}

impl MutationOperation {
    /// `create` operation.
    pub fn create(document: Value) -> Self {
        Self::Create(document)
    }

    /// `createIfNotExists` operation.
    pub fn create_if_not_exists(document: Value) -> Self {
        Self::CreateIfNotExists(document)
    }

    /// `createOrReplace` operation.
    pub fn create_or_replace(document: Value) -> Self {
        Self::CreateOrReplace(document)
    }

    /// `delete` operation.
    pub fn delete(id: impl Into<String>) -> Self {
        Self::Delete(DeleteTarget { id: id.into() })
    }

    /// `patch` operation.
    pub fn patch(patch: PatchPayload) -> Self {
        Self::Patch(patch)
    }

    /// Wire name of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::CreateIfNotExists(_) => "createIfNotExists",
            Self::CreateOrReplace(_) => "createOrReplace",
            Self::Delete(_) => "delete",
            Self::Patch(_) => "patch",
        }
    }

    /// Returns true for the three creation variants.
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::CreateIfNotExists(_) | Self::CreateOrReplace(_)
        )
    }

    /// Id of the document this operation targets, when known.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Create(doc) | Self::CreateIfNotExists(doc) | Self::CreateOrReplace(doc) => {
                doc.document_id()
            }
            Self::Delete(target) => Some(&target.id),
            Self::Patch(patch) => patch.id.as_deref(),
        }
    }
}

/// A batch of operations with its revision chain metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Operations in application order.
    #[serde(rename = "mutations")]
    pub operations: Vec<MutationOperation>,
    /// Correlates a local mutation with its echo from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Revision the mutation must be applied on top of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_rev: Option<String>,
    /// Revision of the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_rev: Option<String>,
    /// Author identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// When the server applied the mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque effects payload, carried through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Value>,
}

impl Mutation {
    /// Creates a mutation without metadata.
    pub fn new(operations: Vec<MutationOperation>) -> Self {
        Self {
            operations,
            ..Self::default()
        }
    }

    /// Sets the transaction id.
    #[must_use]
    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    /// Sets the previous revision.
    #[must_use]
    pub fn with_previous_rev(mut self, rev: impl Into<String>) -> Self {
        self.previous_rev = Some(rev.into());
        self
    }

    /// Sets the result revision.
    #[must_use]
    pub fn with_result_rev(mut self, rev: impl Into<String>) -> Self {
        self.result_rev = Some(rev.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the author identity.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Replaces the transaction id with a fresh random one.
    pub fn assign_random_transaction_id(&mut self) {
        self.transaction_id = Some(Uuid::new_v4().to_string());
    }

    /// Transaction id, if any.
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// True if the first operation creates a document, so the mutation may
    /// apply where no document exists yet.
    pub fn applies_to_missing_document(&self) -> bool {
        self.operations
            .first()
            .is_some_and(MutationOperation::is_creation)
    }

    /// Distinct ids of the documents this mutation touches, in first-seen order.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.operations.iter().filter_map(MutationOperation::document_id) {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }

    /// Copy keeping only the operations that target `id`.
    pub fn for_document(&self, id: &str) -> Mutation {
        Mutation {
            operations: self
                .operations
                .iter()
                .filter(|op| op.document_id().map_or(true, |target| target == id))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// Parses patches and validates creations.
    ///
    /// # Errors
    ///
    /// Fails on malformed patches and on creations of documents that are not
    /// objects with an `_id`.
    pub fn compile(&self) -> CoreResult<CompiledMutation> {
        let mut steps = Vec::with_capacity(self.operations.len());
        for operation in &self.operations {
            steps.push(match operation {
                MutationOperation::Create(doc) => Step::Create(creatable(doc, "create")?),
                MutationOperation::CreateIfNotExists(doc) => {
                    Step::CreateIfNotExists(creatable(doc, "createIfNotExists")?)
                }
                MutationOperation::CreateOrReplace(doc) => {
                    Step::CreateOrReplace(creatable(doc, "createOrReplace")?)
                }
                MutationOperation::Delete(target) => Step::Delete(target.id.clone()),
                MutationOperation::Patch(patch) => Step::Patch(patch.compile()?),
            });
        }
        Ok(CompiledMutation {
            steps,
            previous_rev: self.previous_rev.clone(),
            revision: self
                .result_rev
                .clone()
                .or_else(|| self.transaction_id.clone()),
            timestamp: self
                .timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        })
    }

    /// Applies the mutation to `document` (`None` when it does not exist).
    ///
    /// # Errors
    ///
    /// Fails with a revision conflict when `previous_rev` is set and differs
    /// from the document's `_rev`, and on compile or patch failures.
    pub fn apply(&self, document: Option<&Value>) -> CoreResult<Option<Value>> {
        self.compile()?.apply(document)
    }

    /// Concatenates the operations of `mutations` into one mutation with a
    /// fresh transaction id.
    pub fn squash(mutations: &[Mutation]) -> Mutation {
        let mut squashed = Mutation::new(
            mutations
                .iter()
                .flat_map(|m| m.operations.iter().cloned())
                .collect(),
        );
        squashed.assign_random_transaction_id();
        squashed
    }

    /// Applies `mutations` in order.
    ///
    /// # Errors
    ///
    /// Stops at the first mutation that fails.
    pub fn apply_all(document: Option<&Value>, mutations: &[Mutation]) -> CoreResult<Option<Value>> {
        let mut current = document.cloned();
        for mutation in mutations {
            current = mutation.apply(current.as_ref())?;
        }
        Ok(current)
    }
}

fn creatable(doc: &Value, kind: &str) -> CoreResult<Value> {
    match doc.as_object() {
        Some(_) if doc.document_id().is_some() => Ok(doc.clone()),
        Some(_) => Err(CoreError::precondition(format!("{kind} requires an _id"))),
        None => Err(CoreError::precondition(format!(
            "{kind} expects an object, found {}",
            doc.type_name()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Create(Value),
    CreateIfNotExists(Value),
    CreateOrReplace(Value),
    Delete(String),
    Patch(CompiledPatch),
}

/// A mutation with its patches parsed, ready to apply repeatedly.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMutation {
    steps: Vec<Step>,
    previous_rev: Option<String>,
    revision: Option<String>,
    timestamp: Option<String>,
}

impl CompiledMutation {
    /// Applies the compiled operations to `document`.
    ///
    /// # Errors
    ///
    /// See [`Mutation::apply`].
    pub fn apply(&self, document: Option<&Value>) -> CoreResult<Option<Value>> {
        if let Some(expected) = &self.previous_rev {
            let actual = document.and_then(Value::revision);
            if actual != Some(expected.as_str()) {
                return Err(CoreError::revision_conflict(expected.clone(), actual));
            }
        }

        let mut current = document.cloned();
        for step in &self.steps {
            current = match step {
                Step::Create(doc) | Step::CreateIfNotExists(doc) => match current {
                    Some(existing) => Some(existing),
                    None => Some(self.stamp_created(doc)),
                },
                Step::CreateOrReplace(doc) => match current {
                    Some(existing) if !same_document(&existing, doc.document_id()) => {
                        Some(existing)
                    }
                    _ => Some(self.stamp_created(doc)),
                },
                Step::Delete(id) => match current {
                    Some(existing) if !same_document(&existing, Some(id)) => Some(existing),
                    _ => None,
                },
                Step::Patch(patch) => match current {
                    Some(existing) => Some(patch.apply(&existing)?),
                    None => None,
                },
            };
        }

        Ok(current.map(|doc| self.stamp_result(doc)))
    }

    fn stamp_created(&self, doc: &Value) -> Value {
        match &self.timestamp {
            Some(ts) if doc.get("_createdAt").is_none() => {
                doc.with_attribute("_createdAt", Value::from(ts.as_str()))
            }
            _ => doc.clone(),
        }
    }

    fn stamp_result(&self, mut doc: Value) -> Value {
        if let Some(ts) = &self.timestamp {
            doc = doc.with_attribute("_updatedAt", Value::from(ts.as_str()));
        }
        if let Some(rev) = &self.revision {
            doc = doc.with_attribute("_rev", Value::from(rev.as_str()));
        }
        doc
    }
}

/// False only when both ids are known and differ.
fn same_document(existing: &Value, id: Option<&str>) -> bool {
    match (existing.document_id(), id) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}
