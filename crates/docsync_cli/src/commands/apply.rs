//! Apply command implementation.

use std::path::Path;

use docsync_codec::to_json_pretty;
use docsync_core::Mutation;
use tracing::debug;

use crate::{read_document, read_operations, CliResult, OutputFormat};

/// Runs the apply command.
///
/// Prints the resulting document, or `null` when the mutations delete it.
pub fn run(document: &Path, mutations: &Path, format: OutputFormat) -> CliResult<String> {
    let doc = read_document(document)?;
    let operations = read_operations(mutations)?;
    debug!(operations = operations.len(), "applying mutations");

    let result = Mutation::new(operations).apply(Some(&doc))?;
    match (result, format) {
        (None, _) => Ok("null".to_string()),
        (Some(doc), OutputFormat::Json) => Ok(serde_json::to_string(&doc)?),
        (Some(doc), OutputFormat::Text) => Ok(to_json_pretty(&doc)?),
    }
}
