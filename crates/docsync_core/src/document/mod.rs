//! Document state machines.
//!
//! - [`BufferedDocument`] tracks HEAD (confirmed) and EDGE (optimistic).
//! - [`SquashingBuffer`] coalesces local edits between commits.
//! - [`LocalDocument`] combines both with a serial commit queue.

mod buffered;
mod local;
mod squash;

pub use buffered::{BufferedDocument, DocumentEvent, Submission};
pub use local::{CommitId, CommitRequest, LocalDocument, LocalEvent};
pub use squash::SquashingBuffer;
