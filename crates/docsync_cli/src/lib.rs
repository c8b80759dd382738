//! # docsync CLI
//!
//! Command-line tools for working with documents offline.
//!
//! This crate provides:
//! - `match` - Evaluate a path expression against a document
//! - `apply` - Apply mutations to a document
//! - `diff` - Produce a diff-match-patch patch between two texts
//! - `patch` - Apply a diff-match-patch patch to a text
//! - `squash` - Coalesce a series of mutations into a compact one
//!
//! Every command returns its rendered output so callers decide where it goes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
mod error;

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use docsync_codec::{from_json_str, Value};
use docsync_core::MutationOperation;

pub use error::{CliError, CliResult};

/// Output format of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON.
    Json,
}

fn read_text(path: &Path) -> CliResult<String> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn read_document(path: &Path) -> CliResult<Value> {
    Ok(from_json_str(&read_text(path)?)?)
}

/// Reads operations from a JSON array, or from the `mutations` array of a
/// mutate request body.
fn read_operations(path: &Path) -> CliResult<Vec<MutationOperation>> {
    let text = read_text(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let operations = match value {
        serde_json::Value::Object(mut body) => body
            .remove("mutations")
            .ok_or_else(|| CliError::input("expected an array of mutations"))?,
        other => other,
    };
    Ok(serde_json::from_value(operations)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write(contents: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), contents).unwrap();
        file
    }

    #[test]
    fn operations_from_array_or_body() {
        let array = write(r#"[{"delete": {"id": "a"}}]"#);
        let body = write(r#"{"mutations": [{"delete": {"id": "a"}}], "transactionId": "t"}"#);
        assert_eq!(
            read_operations(array.path()).unwrap(),
            read_operations(body.path()).unwrap()
        );
    }

    #[test]
    fn malformed_document() {
        let file = write("{not json");
        assert!(matches!(
            read_document(file.path()),
            Err(CliError::Codec(_))
        ));
    }
}
