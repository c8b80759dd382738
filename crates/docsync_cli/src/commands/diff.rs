//! Diff command implementation.

use std::path::Path;

use docsync_core::dmp::{make_patches, patches_to_text};
use serde_json::json;

use crate::{read_text, CliResult, OutputFormat};

/// Runs the diff command.
pub fn run(from: &Path, to: &Path, format: OutputFormat) -> CliResult<String> {
    let patches = make_patches(&read_text(from)?, &read_text(to)?);
    let text = patches_to_text(&patches);
    match format {
        OutputFormat::Text => Ok(text),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "hunks": patches.len(),
            "patch": text,
        }))?),
    }
}
