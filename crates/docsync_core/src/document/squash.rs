//! Squashing buffer: coalesces rapid local edits into compact commits.

use std::collections::BTreeMap;

use docsync_codec::Value;
use tracing::{debug, trace};

use crate::dmp::make_patch_text;
use crate::error::CoreResult;
use crate::mutation::{Mutation, MutationOperation};
use crate::patch::PatchPayload;
use crate::path::{extract_with_path, parse, to_path_string};

/// Buffers local operations between commits.
///
/// Plain attribute `set`s are kept per canonical path, last write wins, and
/// string edits are turned into `diffMatchPatch` deltas against the
/// prestage value. Everything else flushes the buffer and is kept verbatim.
#[derive(Debug, Clone)]
pub struct SquashingBuffer {
    basis: Option<Value>,
    prestage: Option<Value>,
    set_operations: BTreeMap<String, MutationOperation>,
    document_present: bool,
    staged: Vec<MutationOperation>,
    out: Vec<MutationOperation>,
}

impl SquashingBuffer {
    /// Creates an empty buffer on top of `basis`.
    pub fn new(basis: Option<Value>) -> Self {
        Self {
            prestage: basis.clone(),
            basis,
            set_operations: BTreeMap::new(),
            document_present: false,
            staged: Vec::new(),
            out: Vec::new(),
        }
    }

    /// Adds every operation of `mutation`.
    ///
    /// # Errors
    ///
    /// Fails when a flushed operation does not apply to the prestage document.
    pub fn add(&mut self, mutation: &Mutation) -> CoreResult<()> {
        for operation in &mutation.operations {
            self.add_operation(operation.clone())?;
        }
        Ok(())
    }

    /// Adds one operation, optimising plain sets on the buffered document.
    ///
    /// # Errors
    ///
    /// See [`SquashingBuffer::add`].
    pub fn add_operation(&mut self, operation: MutationOperation) -> CoreResult<()> {
        let Some(id) = self
            .prestage
            .as_ref()
            .and_then(Value::document_id)
            .map(str::to_string)
        else {
            return self.flush_with(operation);
        };

        match operation {
            MutationOperation::Patch(patch)
                if patch.is_plain_set() && patch.id.as_deref() == Some(id.as_str()) =>
            {
                let mut unoptimisable = BTreeMap::new();
                for (path, value) in patch.set.into_iter().flatten() {
                    if !self.optimise_set_operation(&id, &path, &value) {
                        unoptimisable.insert(path, value);
                    }
                }
                if unoptimisable.is_empty() {
                    return Ok(());
                }
                let mut payload = PatchPayload::new(id);
                payload.set = Some(unoptimisable);
                self.staged.push(MutationOperation::Patch(payload));
                self.stash()
            }
            MutationOperation::CreateIfNotExists(doc) if doc.document_id() == Some(id.as_str()) => {
                if self.document_present {
                    return Ok(());
                }
                self.document_present = true;
                self.staged.push(MutationOperation::CreateIfNotExists(doc));
                self.stash()
            }
            other => self.flush_with(other),
        }
    }

    fn flush_with(&mut self, operation: MutationOperation) -> CoreResult<()> {
        debug!(kind = operation.kind(), "unoptimisable operation, flushing buffer");
        self.staged.push(operation);
        self.stash()
    }

    /// Tries to hold `path = value` as a keyed operation. Returns false when
    /// the set has to be sent as is.
    fn optimise_set_operation(&mut self, id: &str, path: &str, value: &Value) -> bool {
        if value.is_container() || value.is_null() {
            return false;
        }
        let (Ok(expr), Some(prestage)) = (parse(path), self.prestage.as_ref()) else {
            return false;
        };
        let matches = match extract_with_path(&expr, prestage) {
            Ok(matches) if matches.len() == 1 => matches,
            _ => return false,
        };
        let current = &matches[0];
        if current.value.is_container() || current.value.is_null() {
            return false;
        }

        let key = to_path_string(&current.path);
        let operation = if current.value == *value {
            None
        } else if let (Some(from), Some(to)) = (current.value.as_text(), value.as_text()) {
            Some(PatchPayload::new(id).with_diff_match_patch(path, make_patch_text(from, to)))
        } else {
            Some(PatchPayload::new(id).with_set(path, value.clone()))
        };

        match operation {
            Some(patch) => {
                trace!(path = %key, "buffered set");
                self.set_operations
                    .insert(key, MutationOperation::Patch(patch));
            }
            None => {
                self.set_operations.remove(&key);
            }
        }
        true
    }

    /// Moves the keyed sets and staged operations into the outgoing list.
    fn stash(&mut self) -> CoreResult<()> {
        let operations: Vec<MutationOperation> = std::mem::take(&mut self.set_operations)
            .into_values()
            .chain(self.staged.drain(..))
            .collect();
        if operations.is_empty() {
            return Ok(());
        }
        trace!(count = operations.len(), "stashing buffered operations");
        self.prestage = Mutation::new(operations.clone()).apply(self.prestage.as_ref())?;
        self.out.extend(operations);
        Ok(())
    }

    /// True if anything was buffered since the last purge.
    pub fn has_changes(&self) -> bool {
        !self.out.is_empty() || !self.set_operations.is_empty() || !self.staged.is_empty()
    }

    /// Flushes and returns everything buffered as one mutation whose
    /// transaction id and result revision are `transaction_id`.
    ///
    /// # Errors
    ///
    /// See [`SquashingBuffer::add`].
    pub fn purge(&mut self, transaction_id: Option<&str>) -> CoreResult<Option<Mutation>> {
        self.stash()?;
        self.document_present = false;
        if self.out.is_empty() {
            return Ok(None);
        }
        let mut mutation = Mutation::new(std::mem::take(&mut self.out));
        if let Some(txn) = transaction_id {
            mutation.transaction_id = Some(txn.to_string());
            mutation.result_rev = Some(txn.to_string());
        }
        self.basis = self.prestage.clone();
        Ok(Some(mutation))
    }

    /// Re-applies the buffered operations on a new basis and returns the new
    /// prestage document.
    ///
    /// # Errors
    ///
    /// Fails when the outgoing operations no longer apply to `basis`.
    pub fn rebase(&mut self, basis: Option<Value>) -> CoreResult<Option<Value>> {
        self.stash()?;
        match basis {
            None => {
                self.out.clear();
                self.basis = None;
                self.prestage = None;
            }
            Some(basis) => {
                self.prestage = if self.out.is_empty() {
                    Some(basis.clone())
                } else {
                    Mutation::new(self.out.clone()).apply(Some(&basis))?
                };
                self.basis = Some(basis);
            }
        }
        Ok(self.prestage.clone())
    }

    /// Document the buffer started from.
    pub fn basis(&self) -> Option<&Value> {
        self.basis.as_ref()
    }

    /// Basis with every stashed operation applied.
    pub fn prestage(&self) -> Option<&Value> {
        self.prestage.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_codec::from_json_str;

    fn json(text: &str) -> Value {
        from_json_str(text).unwrap()
    }

    fn set(path: &str, value: impl Into<Value>) -> Mutation {
        Mutation::new(vec![MutationOperation::patch(
            PatchPayload::new("d").with_set(path, value),
        )])
    }

    fn base() -> Value {
        json(r#"{"_id": "d", "_rev": "r0", "title": "The quick fox", "n": 1, "tags": ["a"]}"#)
    }

    #[test]
    fn sequential_string_sets_become_one_text_patch() {
        let mut buffer = SquashingBuffer::new(Some(base()));
        buffer.add(&set("title", "The quick brown fox")).unwrap();
        buffer.add(&set("title", "The quick brown fox jumps")).unwrap();

        let mutation = buffer.purge(Some("t1")).unwrap().unwrap();
        assert_eq!(mutation.operations.len(), 1);
        let MutationOperation::Patch(patch) = &mutation.operations[0] else {
            panic!("expected a patch");
        };
        assert!(patch.set.is_none());
        assert!(patch.diff_match_patch.as_ref().unwrap().contains_key("title"));
        assert_eq!(mutation.transaction_id(), Some("t1"));

        let result = mutation.apply(Some(&base())).unwrap().unwrap();
        assert_eq!(result.get("title"), Some(&Value::from("The quick brown fox jumps")));
    }

    #[test]
    fn setting_back_to_the_original_value_cancels_out() {
        let mut buffer = SquashingBuffer::new(Some(base()));
        buffer.add(&set("n", 2)).unwrap();
        buffer.add(&set("n", 1)).unwrap();
        assert!(!buffer.has_changes());
        assert_eq!(buffer.purge(None).unwrap(), None);
    }

    #[test]
    fn non_string_primitives_stay_sets() {
        let mut buffer = SquashingBuffer::new(Some(base()));
        buffer.add(&set("n", 5)).unwrap();
        let mutation = buffer.purge(None).unwrap().unwrap();
        assert_eq!(mutation.operations, set("n", 5).operations);
    }

    #[test]
    fn container_values_flush_verbatim() {
        let mut buffer = SquashingBuffer::new(Some(base()));
        buffer.add(&set("title", "x")).unwrap();
        buffer.add(&set("tags", Value::array(vec![Value::from("b")]))).unwrap();
        assert_eq!(buffer.prestage().unwrap().get("title"), Some(&Value::from("x")));

        let mutation = buffer.purge(None).unwrap().unwrap();
        assert_eq!(mutation.operations.len(), 2);
        let result = mutation.apply(Some(&base())).unwrap().unwrap();
        assert_eq!(result.get("title"), Some(&Value::from("x")));
        assert_eq!(result.get("tags"), Some(&Value::array(vec![Value::from("b")])));
    }

    #[test]
    fn repeated_create_if_not_exists_is_sent_once() {
        let mut buffer = SquashingBuffer::new(Some(base()));
        let create = Mutation::new(vec![MutationOperation::create_if_not_exists(json(
            r#"{"_id": "d"}"#,
        ))]);
        buffer.add(&create).unwrap();
        buffer.add(&create).unwrap();
        assert_eq!(buffer.purge(None).unwrap().unwrap().operations.len(), 1);
    }

    #[test]
    fn rebase_replays_outgoing_operations() {
        let mut buffer = SquashingBuffer::new(Some(base()));
        buffer.add(&set("n", 7)).unwrap();
        let moved = base().with_attribute("other", Value::from(true));
        let prestage = buffer.rebase(Some(moved)).unwrap().unwrap();
        assert_eq!(prestage.get("n"), Some(&Value::Integer(7)));
        assert_eq!(prestage.get("other"), Some(&Value::Bool(true)));
        assert!(buffer.has_changes());

        assert_eq!(buffer.rebase(None).unwrap(), None);
        assert!(!buffer.has_changes());
    }
}
