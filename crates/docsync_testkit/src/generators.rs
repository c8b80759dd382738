//! Property-based test generators using proptest.
//!
//! Provides strategies for documents, path expressions, text and mutations
//! that respect the invariants the engine expects (documents carry an `_id`,
//! generated paths always parse, local mutations carry a transaction id).

use docsync_codec::Value;
use docsync_core::{Mutation, MutationOperation, PatchPayload};
use proptest::prelude::*;

/// Attribute names used by generated documents and mutations.
pub const FIELD_NAMES: &[&str] = &["title", "body", "count", "flag", "score"];

/// Strategy for identifier-like attribute names.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,7}")
        .expect("Invalid regex")
        .prop_filter("keywords read as literals", |s| {
            !matches!(s.as_str(), "true" | "false" | "null")
        })
}

/// Strategy for short text, including non-ASCII characters.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 .,éß漢🙂]{0,40}").expect("Invalid regex")
}

/// Strategy for leaf values.
pub fn primitive_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Integer),
        text_strategy().prop_map(Value::from),
    ]
}

/// Strategy for arbitrary nested values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    primitive_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::array),
            prop::collection::btree_map(identifier_strategy(), inner, 0..4)
                .prop_map(|map| Value::object(map)),
        ]
    })
}

/// Strategy for the value of one of [`FIELD_NAMES`].
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-100i64..100).prop_map(Value::Integer),
        any::<bool>().prop_map(Value::Bool),
        text_strategy().prop_map(Value::from),
    ]
}

/// Strategy for documents with the given id and revision.
pub fn document_strategy(id: &'static str, rev: &'static str) -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        prop::sample::select(FIELD_NAMES).prop_map(str::to_string),
        field_value_strategy(),
        0..FIELD_NAMES.len(),
    )
    .prop_map(move |fields| {
        fields
            .into_iter()
            .fold(Value::object([("_id", Value::from(id)), ("_rev", Value::from(rev))]), |doc, (k, v)| {
                doc.with_attribute(k, v)
            })
    })
}

fn path_step_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => identifier_strategy().prop_map(|name| format!(".{name}")),
        2 => (-5i64..10).prop_map(|i| format!("[{i}]")),
        1 => Just("[*]".to_string()),
        1 => (0i64..4, 4i64..8).prop_map(|(a, b)| format!("[{a}:{b}]")),
        1 => (1i64..4).prop_map(|step| format!("[::{step}]")),
        1 => identifier_strategy().prop_map(|key| format!("[_key==\"{key}\"]")),
        1 => (-10i64..10).prop_map(|n| format!("[@ > {n}]")),
        1 => identifier_strategy().prop_map(|name| format!("[{name} != null]")),
        1 => identifier_strategy().prop_map(|name| format!("..{name}")),
        1 => prop::string::string_regex("[a-z]{1,4} [a-z]{1,4}")
            .expect("Invalid regex")
            .prop_map(|name| format!("['{name}']")),
        1 => (identifier_strategy(), identifier_strategy())
            .prop_map(|(a, b)| format!("[{a},{b}]")),
    ]
}

/// Strategy for path expression texts that always parse.
pub fn path_text_strategy() -> impl Strategy<Value = String> {
    (
        identifier_strategy(),
        prop::collection::vec(path_step_strategy(), 0..5),
    )
        .prop_map(|(head, steps)| {
            let mut text = head;
            for step in steps {
                text.push_str(&step);
            }
            text
        })
}

/// Strategy for a patch that sets one of [`FIELD_NAMES`] on document `id`.
pub fn set_operation_strategy(id: &'static str) -> impl Strategy<Value = MutationOperation> {
    (prop::sample::select(FIELD_NAMES), field_value_strategy()).prop_map(move |(field, value)| {
        MutationOperation::patch(PatchPayload::new(id).with_set(field, value))
    })
}

/// Strategy for local edits of document `id`: sets, unsets and increments
/// of [`FIELD_NAMES`].
pub fn edit_operation_strategy(id: &'static str) -> impl Strategy<Value = MutationOperation> {
    prop_oneof![
        3 => set_operation_strategy(id),
        1 => prop::sample::select(FIELD_NAMES)
            .prop_map(move |field| MutationOperation::patch(PatchPayload::new(id).with_unset(field))),
        1 => (prop::sample::select(FIELD_NAMES), 1i64..5).prop_map(move |(field, n)| {
            MutationOperation::patch(PatchPayload::new(id).with_inc(field, n))
        }),
    ]
}

/// Strategy for a sequence of edit mutations of document `id`.
pub fn edit_sequence_strategy(
    id: &'static str,
    max_mutations: usize,
) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(
        prop::collection::vec(edit_operation_strategy(id), 1..3).prop_map(Mutation::new),
        1..max_mutations.max(2),
    )
}

/// One step of a randomized buffered-document session.
#[derive(Debug, Clone)]
pub enum DocumentStep {
    /// Stage a local set.
    Stage {
        /// Field to set.
        field: &'static str,
        /// Value to set.
        value: Value,
    },
    /// Report the oldest pending submission as successful.
    Succeed,
    /// Report the oldest pending submission as failed.
    Fail,
    /// Receive a foreign server mutation that sets a field.
    Remote {
        /// Field to set.
        field: &'static str,
        /// Value to set.
        value: Value,
    },
    /// Receive the server echo of the oldest submitted mutation.
    Echo,
}

/// Strategy for a single session step.
pub fn document_step_strategy() -> impl Strategy<Value = DocumentStep> {
    prop_oneof![
        3 => (prop::sample::select(FIELD_NAMES), field_value_strategy())
            .prop_map(|(field, value)| DocumentStep::Stage { field, value }),
        2 => Just(DocumentStep::Succeed),
        1 => Just(DocumentStep::Fail),
        2 => (prop::sample::select(FIELD_NAMES), field_value_strategy())
            .prop_map(|(field, value)| DocumentStep::Remote { field, value }),
        2 => Just(DocumentStep::Echo),
    ]
}

/// Strategy for a session of steps.
pub fn document_session_strategy(max_steps: usize) -> impl Strategy<Value = Vec<DocumentStep>> {
    prop::collection::vec(document_step_strategy(), 0..max_steps)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
