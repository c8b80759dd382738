//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the pair synchronizer.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use docsync_sync_protocol::{
    ActionRequest, ActionResponse, ClientConfig, DocumentsResponse, ErrorResponse, MutateRequest,
    MutateResponse, ProtocolError,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SyncConfig;

use crate::error::{SyncError, SyncResult};
use crate::transport::DocumentTransport;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// A request handed to an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body of `POST` requests.
    pub body: Option<Vec<u8>>,
    /// Time allowed for the whole exchange.
    pub timeout: Duration,
}

/// A response from an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A response with a JSON body.
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        Self {
            status,
            body: serde_json::to_vec(body).unwrap_or_default(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why an [`HttpClient`] received no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpClientError {
    /// The request outlived [`HttpRequest::timeout`].
    #[error("request timed out")]
    TimedOut,

    /// The request failed before a response arrived.
    #[error("{0}")]
    Failed(String),
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
/// An `Err` means no response was received at all.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    ///
    /// Implementations give up with [`HttpClientError::TimedOut`] once
    /// `request.timeout` has elapsed.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-based document transport.
///
/// Uses JSON encoding for request/response bodies.
pub struct HttpTransport<C: HttpClient> {
    config: ClientConfig,
    client: C,
    timeout: Duration,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(config: ClientConfig, client: C) -> Self {
        Self {
            config,
            client,
            timeout: DEFAULT_TIMEOUT,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport with the client settings and timeout of `config`.
    pub fn from_sync_config(config: &SyncConfig, client: C) -> Self {
        Self::new(config.client.clone(), client).with_timeout(config.timeout)
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(token) = &self.config.token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }

    fn send<Res: DeserializeOwned>(&self, request: HttpRequest) -> SyncResult<Res> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        debug!(url = %request.url, "sending request");

        let response = self.client.send(request).map_err(|e| {
            warn!(error = %e, "no response");
            *self.last_error.write() = Some(e.to_string());
            match e {
                HttpClientError::TimedOut => SyncError::Timeout,
                HttpClientError::Failed(message) => SyncError::transport_retryable(message),
            }
        })?;

        if !response.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&response.body)
                .map(|body| body.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
            warn!(status = response.status, %message, "request rejected");
            *self.last_error.write() = Some(message.clone());
            return Err(SyncError::http(response.status, message));
        }

        *self.last_error.write() = None;
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Protocol(ProtocolError::from(e)))
    }

    fn post<Req: Serialize, Res: DeserializeOwned>(&self, url: String, body: &Req) -> SyncResult<Res> {
        let body = serde_json::to_vec(body).map_err(ProtocolError::from)?;
        self.send(HttpRequest {
            method: HttpMethod::Post,
            url,
            headers: self.headers(),
            body: Some(body),
            timeout: self.timeout,
        })
    }
}

impl<C: HttpClient> DocumentTransport for HttpTransport<C> {
    fn fetch_documents(&self, ids: &[&str]) -> SyncResult<DocumentsResponse> {
        let url = format!("{}/{}", self.config.data_url("doc"), ids.join(","));
        self.send(HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: self.headers(),
            body: None,
            timeout: self.timeout,
        })
    }

    fn mutate(&self, request: &MutateRequest) -> SyncResult<MutateResponse> {
        let url = format!(
            "{}?visibility=async&returnDocuments=false&skipCrossDatasetReferenceValidation=true&tag=document.commit",
            self.config.data_url("mutate")
        );
        self.post(url, request)
    }

    fn action(&self, request: &ActionRequest) -> SyncResult<ActionResponse> {
        let url = format!("{}?tag=document.commit", self.config.data_url("actions"));
        self.post(url, request)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a request for `path`, the URL part starting at `/data/`.
    fn handle(&self, method: HttpMethod, path: &str, body: Option<&[u8]>) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let path = request
            .url
            .find("/data/")
            .map_or(request.url.as_str(), |i| &request.url[i..]);
        let started = Instant::now();
        let response = self
            .server
            .handle(request.method, path, request.body.as_deref());
        if started.elapsed() > request.timeout {
            return Err(HttpClientError::TimedOut);
        }
        Ok(response)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
