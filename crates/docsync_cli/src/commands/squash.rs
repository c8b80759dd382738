//! Squash command implementation.

use std::path::Path;

use docsync_core::SquashingBuffer;
use tracing::debug;

use crate::{read_document, read_operations, CliResult, OutputFormat};

/// Runs the squash command.
///
/// Feeds the operations through a squashing buffer seeded with the document
/// and prints the operations it would commit.
pub fn run(document: &Path, mutations: &Path, format: OutputFormat) -> CliResult<String> {
    let doc = read_document(document)?;
    let operations = read_operations(mutations)?;
    let input = operations.len();

    let mut buffer = SquashingBuffer::new(Some(doc));
    for operation in operations {
        buffer.add_operation(operation)?;
    }
    let squashed = buffer
        .purge(None)?
        .map(|mutation| mutation.operations)
        .unwrap_or_default();
    debug!(input, output = squashed.len(), "squashed operations");

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&squashed)?),
        OutputFormat::Text => Ok(format!(
            "{input} operations squashed into {}\n{}",
            squashed.len(),
            serde_json::to_string_pretty(&squashed)?
        )),
    }
}
