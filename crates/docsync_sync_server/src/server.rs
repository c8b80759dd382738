//! The reference server.

use std::sync::Arc;

use docsync_codec::Value;
use docsync_sync_protocol::{
    ActionRequest, ActionResponse, DocumentsResponse, IdPair, ListenerEvent, MutateRequest,
    MutateResponse,
};
use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerResponse, RequestHandler};
use crate::store::DocumentStore;

/// The reference document server.
///
/// Serves the data endpoints the pair synchronizer talks to and opens
/// listeners on document pairs.
///
/// # Example
///
/// ```
/// use docsync_sync_server::{DocumentServer, ServerConfig};
///
/// let server = DocumentServer::new(ServerConfig::new("test"));
/// let response = server.handle_http("GET", "/data/doc/test/a", None);
/// assert_eq!(response.status, 200);
/// ```
pub struct DocumentServer {
    handler: RequestHandler,
    store: Arc<DocumentStore>,
}

impl DocumentServer {
    /// Creates a server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(Arc::new(DocumentStore::new(config)))
    }

    /// Creates a server over an existing store.
    pub fn with_store(store: Arc<DocumentStore>) -> Self {
        let handler = RequestHandler::new(Arc::clone(&store));
        Self { handler, store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Stores a document without running a transaction.
    ///
    /// # Errors
    ///
    /// Fails when the document has no `_id`.
    pub fn seed(&self, document: Value) -> ServerResult<()> {
        self.store.seed(document)
    }

    /// Current version of a document.
    pub fn document(&self, id: &str) -> Option<Value> {
        self.store.document(id)
    }

    /// Handles a fetch.
    pub fn handle_fetch(&self, ids: &[&str]) -> DocumentsResponse {
        self.store.fetch(ids)
    }

    /// Handles a mutate request.
    ///
    /// # Errors
    ///
    /// Fails when the transaction does not apply.
    pub fn handle_mutate(&self, request: MutateRequest) -> ServerResult<MutateResponse> {
        self.store.mutate(request)
    }

    /// Handles an actions request.
    ///
    /// # Errors
    ///
    /// Fails when the transaction does not apply.
    pub fn handle_action(&self, request: ActionRequest) -> ServerResult<ActionResponse> {
        self.store.action(request)
    }

    /// Handles a raw request for a path starting at `/data/`.
    pub fn handle_http(&self, method: &str, path: &str, body: Option<&[u8]>) -> HandlerResponse {
        self.handler.handle(method, path, body)
    }

    /// Opens a listener on both documents of `pair`.
    pub fn listen(&self, pair: &IdPair) -> broadcast::Receiver<ListenerEvent> {
        self.store.subscribe(&pair.ids())
    }

    /// Number of committed transactions.
    pub fn transaction_count(&self) -> u64 {
        self.store.transaction_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_codec::from_json_str;
    use docsync_core::{MutationOperation, PatchPayload};

    #[test]
    fn server_lifecycle() {
        let server = DocumentServer::new(ServerConfig::default());
        assert_eq!(server.transaction_count(), 0);
        assert!(server.store().is_empty());
    }

    #[test]
    fn listen_then_mutate() {
        let server = DocumentServer::new(ServerConfig::default());
        let pair = IdPair::from_published_id("post");
        server
            .seed(from_json_str(r#"{"_id": "post", "_rev": "r0"}"#).unwrap())
            .unwrap();
        let mut listener = server.listen(&pair);

        server
            .handle_mutate(MutateRequest {
                mutations: vec![MutationOperation::patch(
                    PatchPayload::new("post").with_set("title", "x"),
                )],
                transaction_id: Some("tx1".into()),
            })
            .unwrap();

        assert!(matches!(listener.try_recv().unwrap(), ListenerEvent::Welcome(_)));
        let event = listener.try_recv().unwrap();
        assert_eq!(event.document_id(), Some("post"));
        assert_eq!(server.transaction_count(), 1);
    }

    #[test]
    fn shared_store() {
        let store = Arc::new(DocumentStore::new(ServerConfig::default()));
        let server = DocumentServer::with_store(Arc::clone(&store));
        server
            .seed(from_json_str(r#"{"_id": "a"}"#).unwrap())
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(server.handle_fetch(&["a"]).document("a").is_some());
    }
}
