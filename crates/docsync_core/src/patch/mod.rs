//! JSON patches: a set of path-targeted operations against one document.
//!
//! A [`PatchPayload`] is the wire shape (`{"id": .., "set": {..}, ..}`).
//! [`PatchPayload::compile`] parses every path once and yields a
//! [`CompiledPatch`] whose steps run in a fixed order: `set`,
//! `setIfMissing`, `unset`, `inc`, `dec`, `insert`, `diffMatchPatch`.

mod operation;

pub use operation::{InsertPosition, Operation};

use std::collections::BTreeMap;

use docsync_codec::Value;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::accessor::{Accessor, ContainerType};
use crate::dmp::parse_patches;
use crate::error::{CoreError, CoreResult};
use crate::path::{parse, Expr, Lead, MatchResult, Matcher, Target};

/// Insert operation as it appears on the wire: exactly one of
/// `before`, `after` or `replace` plus the items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertPayload {
    /// Insert before the selected items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Insert after the selected items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Replace the selected items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
    /// Items to insert.
    pub items: Vec<Value>,
}

impl InsertPayload {
    fn location(&self) -> CoreResult<(InsertPosition, &str)> {
        match (&self.before, &self.after, &self.replace) {
            (Some(path), None, None) => Ok((InsertPosition::Before, path)),
            (None, Some(path), None) => Ok((InsertPosition::After, path)),
            (None, None, Some(path)) => Ok((InsertPosition::Replace, path)),
            _ => Err(CoreError::invalid_patch(
                "insert needs exactly one of before, after or replace",
            )),
        }
    }
}

/// A patch in wire form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPayload {
    /// Target document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Query selecting target documents. Never evaluated locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Required current revision of the target.
    #[serde(rename = "ifRevisionID", default, skip_serializing_if = "Option::is_none")]
    pub if_revision_id: Option<String>,
    /// Paths to overwrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<BTreeMap<String, Value>>,
    /// Paths to fill when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_if_missing: Option<BTreeMap<String, Value>>,
    /// Paths to remove.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unset: Option<Vec<String>>,
    /// Paths to increment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inc: Option<BTreeMap<String, Value>>,
    /// Paths to decrement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dec: Option<BTreeMap<String, Value>>,
    /// Array insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<InsertPayload>,
    /// Text patches by path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_match_patch: Option<BTreeMap<String, String>>,
}

impl PatchPayload {
    /// Creates an empty patch for document `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Adds a `set` entry.
    #[must_use]
    pub fn with_set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set
            .get_or_insert_with(BTreeMap::new)
            .insert(path.into(), value.into());
        self
    }

    /// Adds a `setIfMissing` entry.
    #[must_use]
    pub fn with_set_if_missing(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_if_missing
            .get_or_insert_with(BTreeMap::new)
            .insert(path.into(), value.into());
        self
    }

    /// Adds an `unset` path.
    #[must_use]
    pub fn with_unset(mut self, path: impl Into<String>) -> Self {
        self.unset.get_or_insert_with(Vec::new).push(path.into());
        self
    }

    /// Adds an `inc` entry.
    #[must_use]
    pub fn with_inc(mut self, path: impl Into<String>, amount: impl Into<Value>) -> Self {
        self.inc
            .get_or_insert_with(BTreeMap::new)
            .insert(path.into(), amount.into());
        self
    }

    /// Adds a `dec` entry.
    #[must_use]
    pub fn with_dec(mut self, path: impl Into<String>, amount: impl Into<Value>) -> Self {
        self.dec
            .get_or_insert_with(BTreeMap::new)
            .insert(path.into(), amount.into());
        self
    }

    /// Sets the insert operation.
    #[must_use]
    pub fn with_insert(mut self, position: InsertPosition, path: impl Into<String>, items: Vec<Value>) -> Self {
        let path = Some(path.into());
        let mut insert = InsertPayload {
            items,
            ..InsertPayload::default()
        };
        match position {
            InsertPosition::Before => insert.before = path,
            InsertPosition::After => insert.after = path,
            InsertPosition::Replace => insert.replace = path,
        }
        self.insert = Some(insert);
        self
    }

    /// Adds a `diffMatchPatch` entry.
    #[must_use]
    pub fn with_diff_match_patch(mut self, path: impl Into<String>, patch: impl Into<String>) -> Self {
        self.diff_match_patch
            .get_or_insert_with(BTreeMap::new)
            .insert(path.into(), patch.into());
        self
    }

    /// Requires the target to be at `revision`.
    #[must_use]
    pub fn with_if_revision(mut self, revision: impl Into<String>) -> Self {
        self.if_revision_id = Some(revision.into());
        self
    }

    /// Returns true if the patch is an id plus `set` entries and nothing else.
    pub fn is_plain_set(&self) -> bool {
        self.id.is_some()
            && self.set.is_some()
            && self.query.is_none()
            && self.if_revision_id.is_none()
            && self.set_if_missing.is_none()
            && self.unset.is_none()
            && self.inc.is_none()
            && self.dec.is_none()
            && self.insert.is_none()
            && self.diff_match_patch.is_none()
    }

    /// Parses every path and text patch.
    ///
    /// # Errors
    ///
    /// Fails on malformed paths or text patches, non-numeric `inc`/`dec`
    /// amounts and ambiguous inserts.
    pub fn compile(&self) -> CoreResult<CompiledPatch> {
        let mut steps = Vec::new();

        for (path, value) in self.set.iter().flatten() {
            steps.push(PatchStep::new(path, Operation::Set(value.clone()))?);
        }
        for (path, value) in self.set_if_missing.iter().flatten() {
            steps.push(PatchStep::new(path, Operation::SetIfMissing(value.clone()))?);
        }
        for path in self.unset.iter().flatten() {
            steps.push(PatchStep::new(path, Operation::Unset)?);
        }
        for (path, amount) in self.inc.iter().flatten() {
            steps.push(PatchStep::new(path, Operation::Inc(numeric(amount)?))?);
        }
        for (path, amount) in self.dec.iter().flatten() {
            steps.push(PatchStep::new(path, Operation::Dec(numeric(amount)?))?);
        }
        if let Some(insert) = &self.insert {
            let (position, path) = insert.location()?;
            steps.push(PatchStep::new(
                path,
                Operation::Insert {
                    position,
                    items: insert.items.clone(),
                },
            )?);
        }
        for (path, text) in self.diff_match_patch.iter().flatten() {
            steps.push(PatchStep::new(path, Operation::DiffMatchPatch(parse_patches(text)?))?);
        }

        Ok(CompiledPatch {
            id: self.id.clone(),
            query: self.query.clone(),
            if_revision_id: self.if_revision_id.clone(),
            steps,
        })
    }

    /// Compiles and applies the patch to `document`.
    ///
    /// # Errors
    ///
    /// See [`PatchPayload::compile`] and [`CompiledPatch::apply`].
    pub fn apply(&self, document: &Value) -> CoreResult<Value> {
        self.compile()?.apply(document)
    }
}

fn numeric(amount: &Value) -> CoreResult<Value> {
    if amount.is_number() {
        Ok(amount.clone())
    } else {
        Err(CoreError::invalid_patch(format!(
            "expected a number, found {}",
            amount.type_name()
        )))
    }
}

/// One path and the operation to run where it matches.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchStep {
    /// Parsed target expression.
    pub path: Expr,
    /// Operation applied at every match.
    pub operation: Operation,
}

impl PatchStep {
    fn new(path: &str, operation: Operation) -> CoreResult<Self> {
        Ok(Self {
            path: parse(path)?,
            operation,
        })
    }

    /// Applies this step below `accessor`.
    ///
    /// # Errors
    ///
    /// Propagates operation precondition failures.
    pub fn apply(&self, accessor: Accessor) -> CoreResult<Accessor> {
        process(&Matcher::from_expr(&self.path), &self.operation, accessor)
    }
}

/// A patch with every path parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPatch {
    id: Option<String>,
    query: Option<String>,
    if_revision_id: Option<String>,
    steps: Vec<PatchStep>,
}

impl CompiledPatch {
    /// Target document id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Steps in application order.
    pub fn steps(&self) -> &[PatchStep] {
        &self.steps
    }

    /// Applies the patch to `document`.
    ///
    /// Documents with a different `_id` are returned unchanged, as are all
    /// documents when the patch is selected by query.
    ///
    /// # Errors
    ///
    /// Fails with a revision conflict when `ifRevisionID` does not match the
    /// document, and on operation precondition failures.
    pub fn apply(&self, document: &Value) -> CoreResult<Value> {
        if let Some(query) = &self.query {
            warn!(query = %query, "skipping query-selected patch");
            return Ok(document.clone());
        }
        if self.id.as_deref() != document.document_id() {
            return Ok(document.clone());
        }
        if let Some(expected) = &self.if_revision_id {
            if document.revision() != Some(expected.as_str()) {
                return Err(CoreError::revision_conflict(expected.clone(), document.revision()));
            }
        }

        let mut accessor = Accessor::new(document.clone());
        for step in &self.steps {
            accessor = step.apply(accessor)?;
        }
        Ok(accessor.into_value())
    }
}

/// Runs one matcher level: follows every lead, then applies the operation
/// to whatever was delivered here.
fn process(matcher: &Matcher, operation: &Operation, accessor: Accessor) -> CoreResult<Accessor> {
    let MatchResult { leads, delivery } = matcher.match_accessor(&accessor)?;
    let mut result = accessor;
    for lead in &leads {
        result = follow(lead, operation, result)?;
    }
    if !delivery.is_empty() {
        result = operation.apply(&delivery, result)?;
    }
    Ok(result)
}

fn follow(lead: &Lead, operation: &Operation, accessor: Accessor) -> CoreResult<Accessor> {
    match &lead.target {
        Target::Current => process(&lead.matcher, operation, accessor),
        Target::Index(_) => {
            let Some(index) = accessor
                .get()
                .as_array()
                .and_then(|items| lead.target.resolve_index(items.len()))
            else {
                return Ok(accessor);
            };
            let Some(child) = accessor.get_index(index)? else {
                return Ok(accessor);
            };
            let updated = process(&lead.matcher, operation, child)?;
            accessor.set_index_accessor(index, updated)
        }
        Target::Attribute(name) => {
            let mut accessor = accessor;
            // set and setIfMissing build missing intermediate objects,
            // overwriting primitives in the way.
            if operation.creates_missing() {
                if accessor.container_type() == ContainerType::Primitive {
                    accessor = accessor.set(Value::empty_object());
                }
                if accessor.container_type() == ContainerType::Object && !accessor.has_attribute(name) {
                    accessor = accessor.set_attribute(name, Value::empty_object())?;
                }
            }
            if accessor.container_type() != ContainerType::Object {
                return Ok(accessor);
            }
            let Some(child) = accessor.get_attribute(name)? else {
                return Ok(accessor);
            };
            let updated = process(&lead.matcher, operation, child)?;
            accessor.set_attribute_accessor(name, updated)
        }
    }
}
