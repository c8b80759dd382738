//! CLI command implementations.

pub mod apply;
pub mod diff;
pub mod match_path;
pub mod patch;
pub mod squash;
