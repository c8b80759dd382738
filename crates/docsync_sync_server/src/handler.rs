//! Request routing for the data endpoints.

use std::sync::Arc;

use docsync_sync_protocol::{ActionRequest, MutateRequest};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::store::DocumentStore;

/// Status and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    /// HTTP status.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl HandlerResponse {
    fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    fn error(err: &ServerError) -> Self {
        Self {
            status: err.status_code(),
            body: serde_json::to_vec(&err.to_response()).unwrap_or_default(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Routes `/data/{endpoint}/{dataset}[/{ids}]` requests to the store.
///
/// Endpoints: `GET doc/{dataset}/{id,id}`, `POST mutate/{dataset}` and
/// `POST actions/{dataset}`. Query strings are ignored.
pub struct RequestHandler {
    store: Arc<DocumentStore>,
}

impl RequestHandler {
    /// Creates a handler over `store`.
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Handles one request.
    pub fn handle(&self, method: &str, path: &str, body: Option<&[u8]>) -> HandlerResponse {
        debug!(method, path, "handling request");
        match self.route(method, path, body) {
            Ok(body) => HandlerResponse::ok(body),
            Err(err) => {
                warn!(method, path, error = %err, "request failed");
                HandlerResponse::error(&err)
            }
        }
    }

    fn route(&self, method: &str, path: &str, body: Option<&[u8]>) -> ServerResult<Vec<u8>> {
        let path = path.split('?').next().unwrap_or_default();
        let mut segments = path.trim_start_matches('/').splitn(4, '/');
        if segments.next() != Some("data") {
            return Err(ServerError::NotFound(path.to_string()));
        }
        let endpoint = segments.next().unwrap_or_default();
        let dataset = segments.next().unwrap_or_default();
        if dataset != self.store.config().dataset {
            return Err(ServerError::NotFound(format!("dataset {dataset:?}")));
        }
        let rest = segments.next();

        match (method, endpoint, rest) {
            ("GET", "doc", Some(ids)) if !ids.is_empty() => {
                let ids: Vec<&str> = ids.split(',').filter(|id| !id.is_empty()).collect();
                Ok(serde_json::to_vec(&self.store.fetch(&ids))?)
            }
            ("POST", "mutate", None) => {
                let request: MutateRequest = serde_json::from_slice(required(body)?)?;
                Ok(serde_json::to_vec(&self.store.mutate(request)?)?)
            }
            ("POST", "actions", None) => {
                let request: ActionRequest = serde_json::from_slice(required(body)?)?;
                Ok(serde_json::to_vec(&self.store.action(request)?)?)
            }
            _ => Err(ServerError::NotFound(format!("{method} {path}"))),
        }
    }
}

fn required(body: Option<&[u8]>) -> ServerResult<&[u8]> {
    body.ok_or_else(|| ServerError::invalid("request body required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use docsync_codec::from_json_str;
    use docsync_sync_protocol::{DocumentsResponse, ErrorResponse, MutateResponse};

    fn create_handler() -> RequestHandler {
        let store = Arc::new(DocumentStore::new(ServerConfig::new("test")));
        store
            .seed(from_json_str(r#"{"_id": "a", "_rev": "r0", "n": 1}"#).unwrap())
            .unwrap();
        RequestHandler::new(store)
    }

    #[test]
    fn fetch_documents() {
        let handler = create_handler();
        let response = handler.handle("GET", "/data/doc/test/a,b", None);
        assert!(response.is_success());
        let body: DocumentsResponse = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body.documents.len(), 1);
        assert_eq!(body.omitted[0].id, "b");
    }

    #[test]
    fn mutate_with_query_string() {
        let handler = create_handler();
        let body = br#"{"mutations": [{"patch": {"id": "a", "inc": {"n": 1}}}], "transactionId": "tx1"}"#;
        let response = handler.handle("POST", "/data/mutate/test?returnDocuments=false", Some(body));
        assert_eq!(response.status, 200);
        let body: MutateResponse = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body.transaction_id, "tx1");
    }

    #[test]
    fn errors_carry_status_and_body() {
        let handler = create_handler();
        let body = br#"{"mutations": [{"create": {"_id": "a"}}]}"#;
        let response = handler.handle("POST", "/data/mutate/test", Some(body));
        assert_eq!(response.status, 409);
        let error: ErrorResponse = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(error.status_code, 409);

        let response = handler.handle("POST", "/data/mutate/test", Some(b"not json"));
        assert_eq!(response.status, 400);
        assert_eq!(handler.handle("POST", "/data/mutate/test", None).status, 400);
    }

    #[test]
    fn unknown_routes() {
        let handler = create_handler();
        assert_eq!(handler.handle("GET", "/data/doc/other/a", None).status, 404);
        assert_eq!(handler.handle("DELETE", "/data/doc/test/a", None).status, 404);
        assert_eq!(handler.handle("GET", "/v1/ping", None).status, 404);
    }
}
