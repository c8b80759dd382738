//! # docsync Sync Engine
//!
//! Keeps a draft/published document pair in step with a document store.
//!
//! This crate provides:
//! - [`PairSynchronizer`], two local documents fed by one listener stream
//!   and drained through one serial commit pipeline
//! - Re-assembly of transactions split over several listener events
//! - A transport abstraction with mock, HTTP and loopback implementations
//! - Commit retry with exponential backoff and hard cancellation
//! - Round-trip latency tracking
//! - A [`Worker`] dispatch loop speaking the worker message contract
//!
//! ## Commit outcomes
//!
//! A rejected commit with a status in [`HARD_CANCEL_STATUSES`] cancels every
//! queued commit of its document, which then resets to the last server
//! state. Any other failure is retried with backoff until the retry policy
//! gives up.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunker;
mod config;
mod error;
mod http;
mod latency;
mod pair;
mod transport;
mod worker;

pub use chunker::{ChunkedEvent, TransactionChunker};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult, HARD_CANCEL_STATUSES};
pub use http::{
    HttpClient, HttpClientError, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    LoopbackClient, LoopbackServer,
};
pub use latency::{LatencyReport, LatencyTracker};
pub use pair::{CommitProgress, PairEvent, PairSynchronizer};
pub use transport::{DocumentTransport, MockTransport};
pub use worker::{Connection, Connector, Worker};
