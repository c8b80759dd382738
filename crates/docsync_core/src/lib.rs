//! # docsync Core
//!
//! Optimistic document editing against a revisioned document store.
//!
//! This crate provides:
//! - A path-addressable [`Accessor`] over immutable document values
//! - Path expressions for selecting values ([`path`])
//! - Character-level diff, match and patch for text ([`dmp`])
//! - Patches and [`Mutation`]s with an optimistic-concurrency revision gate
//! - [`BufferedDocument`], which reconciles server mutations with local edits
//! - [`SquashingBuffer`], which coalesces rapid edits into compact commits
//! - [`LocalDocument`], which drives a serial commit queue on top of both
//!
//! ## Example
//!
//! ```
//! use docsync_codec::from_json_str;
//! use docsync_core::{Mutation, MutationOperation, PatchPayload};
//!
//! let doc = from_json_str(r#"{"_id": "d", "_rev": "r1", "title": "draft"}"#).unwrap();
//! let mutation = Mutation::new(vec![MutationOperation::patch(
//!     PatchPayload::new("d").with_set("title", "final"),
//! )])
//! .with_previous_rev("r1")
//! .with_result_rev("r2");
//!
//! let next = mutation.apply(Some(&doc)).unwrap().unwrap();
//! assert_eq!(next.revision(), Some("r2"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod config;
pub mod dmp;
mod document;
mod error;
mod mutation;
pub mod patch;
pub mod path;

pub use accessor::{Accessor, ContainerType, PathSegment};
pub use config::{DocumentConfig, RetryConfig};
pub use document::{
    BufferedDocument, CommitId, CommitRequest, DocumentEvent, LocalDocument, LocalEvent,
    SquashingBuffer, Submission,
};
pub use error::{CoreError, CoreResult};
pub use mutation::{CompiledMutation, DeleteTarget, Mutation, MutationOperation};
pub use patch::{CompiledPatch, InsertPayload, InsertPosition, PatchPayload, PatchStep};
pub use path::{extract, extract_with_path, parse, to_path_string, Expr, PathMatch};
