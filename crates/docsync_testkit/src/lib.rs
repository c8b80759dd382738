//! # docsync Testkit
//!
//! Test utilities for docsync.
//!
//! This crate provides:
//! - Property-based test generators using proptest
//! - Sample documents and mutation builders
//! - Shared test vectors for path matching, text patches and patches
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docsync_testkit::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn paths_round_trip(text in path_text_strategy()) {
//!         // ...
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
    pub use proptest::prelude::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
