//! Sample documents and mutation builders.

use docsync_codec::{from_json_str, Value};
use docsync_core::{Mutation, MutationOperation, PatchPayload};

/// Parses a JSON literal, panicking on malformed input.
pub fn json(text: &str) -> Value {
    from_json_str(text).expect("Invalid JSON fixture")
}

/// A published article with keyed array items.
pub fn article() -> Value {
    json(
        r#"{
            "_id": "article-1",
            "_rev": "r0",
            "_type": "article",
            "title": "The quick brown fox",
            "views": 10,
            "tags": ["news", "animals"],
            "authors": [
                {"_key": "a1", "name": "Alice"},
                {"_key": "b2", "name": "Bob"}
            ]
        }"#,
    )
}

/// The draft id of a published document id.
pub fn draft_id(published_id: &str) -> String {
    format!("drafts.{published_id}")
}

/// A mutation with a single `set` patch.
pub fn set_mutation(id: &str, path: &str, value: impl Into<Value>) -> Mutation {
    Mutation::new(vec![MutationOperation::patch(
        PatchPayload::new(id).with_set(path, value),
    )])
}

/// A local mutation: a `set` patch with a transaction id.
pub fn local_set(id: &str, txn: &str, path: &str, value: impl Into<Value>) -> Mutation {
    set_mutation(id, path, value).with_transaction_id(txn)
}

/// Hands out server mutations chained by revision.
///
/// Every mutation built through the chain has `previous_rev` set to the
/// revision produced by the one before it.
#[derive(Debug, Clone)]
pub struct RevisionChain {
    rev: String,
    counter: u64,
}

impl RevisionChain {
    /// Starts a chain at revision `rev`.
    pub fn starting_at(rev: impl Into<String>) -> Self {
        Self {
            rev: rev.into(),
            counter: 0,
        }
    }

    /// Current revision.
    pub fn revision(&self) -> &str {
        &self.rev
    }

    /// Chains `operations` onto the current revision under a new transaction id.
    pub fn next(&mut self, operations: Vec<MutationOperation>) -> Mutation {
        self.counter += 1;
        let txn = format!("remote-{}", self.counter);
        self.next_with_transaction(operations, &txn)
    }

    /// Chains `operations` as the server echo of transaction `txn`.
    pub fn next_with_transaction(&mut self, operations: Vec<MutationOperation>, txn: &str) -> Mutation {
        let mutation = Mutation::new(operations)
            .with_previous_rev(self.rev.clone())
            .with_result_rev(txn)
            .with_transaction_id(txn);
        self.rev = txn.to_string();
        mutation
    }

    /// Chains the echo of a local mutation.
    pub fn echo(&mut self, local: &Mutation) -> Mutation {
        let txn = local.transaction_id().unwrap_or("echo").to_string();
        self.next_with_transaction(local.operations.clone(), &txn)
    }
}
