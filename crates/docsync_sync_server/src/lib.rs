//! # docsync Sync Server
//!
//! In-memory reference document store for docsync.
//!
//! This crate provides:
//! - A revisioned document store with atomic multi-document transactions
//! - The `doc`, `mutate` and `actions` data endpoints
//! - Listener fan-out with one mutation event per touched document
//! - Error to HTTP status mapping
//!
//! # Revisions
//!
//! Every transaction stamps the documents it writes with its transaction id
//! as `_rev`. Listener events carry the revision before and after, which is
//! what clients use to order server mutations against their local edits.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerResponse, RequestHandler};
pub use server::DocumentServer;
pub use store::{DocumentStore, OMITTED_EXISTENCE};
