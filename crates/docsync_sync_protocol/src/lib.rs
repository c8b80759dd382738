//! # docsync Sync Protocol
//!
//! Wire types spoken between a docsync client and a document store.
//!
//! This crate provides:
//! - `ListenerEvent` and `MutationEvent` for the mutation stream
//! - `SseDecoder` for incremental `text/event-stream` decoding
//! - Mutate, action and document fetch bodies
//! - `IdPair` and the mutation-to-action mapping
//! - The worker command/event contract
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ```
//! use docsync_sync_protocol::{ListenerEvent, SseDecoder};
//!
//! let mut decoder = SseDecoder::new();
//! let frames = decoder.push("event: welcome\ndata: {}\n\n");
//! let event = ListenerEvent::from_frame(&frames[0]).unwrap();
//! assert!(matches!(event, Some(ListenerEvent::Welcome(_))));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod actions;
mod error;
mod id_pair;
mod listener;
mod messages;
mod sse;
mod worker;

pub use actions::{is_live_edit, to_actions, EMPTY_ACTION_GUARD_FIELD};
pub use error::{ProtocolError, ProtocolResult};
pub use id_pair::{DocumentVariant, IdPair, DRAFTS_PREFIX};
pub use listener::{
    DisconnectEvent, ListenerEvent, MutationEvent, Transition, Visibility, WelcomeEvent,
};
pub use messages::{
    Action, ActionRequest, ActionResponse, CreateAction, DocumentsResponse, EditAction,
    ErrorResponse, IfExists, MutateOutcome, MutateRequest, MutateResponse, MutateResult,
    OmittedDocument,
};
pub use sse::{SseDecoder, SseFrame};
pub use worker::{
    ClientConfig, ConstructPayload, DocumentEventPayload, Origin, PendingPhase, WorkerCommand,
    WorkerError, WorkerEvent, DEFAULT_API_VERSION,
};
