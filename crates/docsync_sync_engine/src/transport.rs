//! Transport layer abstraction for document requests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use docsync_codec::Value;
use docsync_sync_protocol::{
    ActionRequest, ActionResponse, DocumentsResponse, MutateOutcome, MutateRequest,
    MutateResponse, MutateResult, OmittedDocument,
};
use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};

/// A document transport carries requests to the document store.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing, etc.).
pub trait DocumentTransport: Send + Sync {
    /// Fetches the current snapshots of `ids`.
    fn fetch_documents(&self, ids: &[&str]) -> SyncResult<DocumentsResponse>;

    /// Applies raw mutations.
    fn mutate(&self, request: &MutateRequest) -> SyncResult<MutateResponse>;

    /// Runs document actions.
    fn action(&self, request: &ActionRequest) -> SyncResult<ActionResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A mock transport for testing.
///
/// Serves documents from a map, records every commit request and fails
/// requests with errors queued through [`MockTransport::fail_next`].
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    documents: Mutex<BTreeMap<String, Value>>,
    failures: Mutex<VecDeque<SyncError>>,
    mutate_requests: Mutex<Vec<MutateRequest>>,
    action_requests: Mutex<Vec<ActionRequest>>,
    transaction_counter: AtomicU64,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Serves `document` under its `_id`.
    pub fn set_document(&self, document: Value) {
        if let Some(id) = document.document_id() {
            self.documents.lock().insert(id.to_string(), document);
        }
    }

    /// Fails the next commit request with `error`.
    pub fn fail_next(&self, error: SyncError) {
        self.failures.lock().push_back(error);
    }

    /// Mutate requests received so far.
    pub fn mutate_requests(&self) -> Vec<MutateRequest> {
        self.mutate_requests.lock().clone()
    }

    /// Action requests received so far.
    pub fn action_requests(&self) -> Vec<ActionRequest> {
        self.action_requests.lock().clone()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn check(&self) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn transaction_id(&self, requested: Option<&String>) -> String {
        match requested {
            Some(id) => id.clone(),
            None => format!(
                "mock-tx-{}",
                self.transaction_counter.fetch_add(1, Ordering::SeqCst)
            ),
        }
    }
}

impl DocumentTransport for MockTransport {
    fn fetch_documents(&self, ids: &[&str]) -> SyncResult<DocumentsResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let documents = self.documents.lock();
        let mut response = DocumentsResponse::default();
        for id in ids {
            match documents.get(*id) {
                Some(document) => response.documents.push(document.clone()),
                None => response.omitted.push(OmittedDocument {
                    id: (*id).to_string(),
                    reason: "existence".to_string(),
                }),
            }
        }
        Ok(response)
    }

    fn mutate(&self, request: &MutateRequest) -> SyncResult<MutateResponse> {
        self.mutate_requests.lock().push(request.clone());
        self.check()?;
        let results = request
            .to_mutation()
            .document_ids()
            .into_iter()
            .map(|id| MutateResult {
                id,
                operation: MutateOutcome::Update,
            })
            .collect();
        Ok(MutateResponse {
            transaction_id: self.transaction_id(request.transaction_id.as_ref()),
            results,
        })
    }

    fn action(&self, request: &ActionRequest) -> SyncResult<ActionResponse> {
        self.action_requests.lock().push(request.clone());
        self.check()?;
        Ok(ActionResponse {
            transaction_id: self.transaction_id(request.transaction_id.as_ref()),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_codec::from_json_str;
    use docsync_core::MutationOperation;

    #[test]
    fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());

        transport.set_connected(true);
        transport.close().unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn mock_transport_not_connected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);
        let result = transport.fetch_documents(&["a"]);
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[test]
    fn mock_transport_serves_documents() {
        let transport = MockTransport::new();
        transport.set_document(from_json_str(r#"{"_id": "a", "_rev": "r1"}"#).unwrap());

        let response = transport.fetch_documents(&["a", "drafts.a"]).unwrap();
        assert!(response.document("a").is_some());
        assert_eq!(response.omitted[0].id, "drafts.a");
    }

    #[test]
    fn mock_transport_records_and_fails() {
        let transport = MockTransport::new();
        let request = MutateRequest {
            mutations: vec![MutationOperation::delete("a")],
            transaction_id: Some("t1".into()),
        };
        transport.fail_next(SyncError::http(409, "conflict"));

        assert!(transport.mutate(&request).unwrap_err().is_hard_cancel());
        let response = transport.mutate(&request).unwrap();
        assert_eq!(response.transaction_id, "t1");
        assert_eq!(response.results[0].id, "a");
        assert_eq!(transport.mutate_requests().len(), 2);
    }
}
