//! Match command implementation.

use std::path::Path;

use docsync_codec::to_canonical_json;
use docsync_core::{extract_with_path, parse, to_path_string};
use serde::Serialize;
use tracing::debug;

use crate::{read_document, CliResult, OutputFormat};

/// One match of the expression.
#[derive(Debug, Serialize)]
pub struct MatchEntry {
    /// Path of the match from the document root.
    pub path: String,
    /// The matched value.
    pub value: docsync_codec::Value,
}

/// Runs the match command.
pub fn run(expression: &str, document: &Path, format: OutputFormat) -> CliResult<String> {
    let expr = parse(expression)?;
    debug!(%expr, "parsed expression");
    let root = read_document(document)?;
    let matches: Vec<MatchEntry> = extract_with_path(&expr, &root)?
        .into_iter()
        .map(|m| MatchEntry {
            path: to_path_string(&m.path),
            value: m.value,
        })
        .collect();

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&matches)?),
        OutputFormat::Text => {
            let mut lines = Vec::with_capacity(matches.len());
            for entry in &matches {
                lines.push(format!("{}\t{}", entry.path, to_canonical_json(&entry.value)?));
            }
            Ok(lines.join("\n"))
        }
    }
}
