//! Patch command implementation.

use std::path::Path;

use docsync_core::dmp::apply_patch_text;
use serde_json::json;
use tracing::warn;

use crate::{read_text, CliResult, OutputFormat};

/// Runs the patch command.
///
/// Hunks that cannot be placed are skipped and reported.
pub fn run(patch: &Path, text: &Path, format: OutputFormat) -> CliResult<String> {
    let (patched, applied) = apply_patch_text(&read_text(patch)?, &read_text(text)?)?;
    let failed = applied.iter().filter(|ok| !**ok).count();
    if failed > 0 {
        warn!(failed, total = applied.len(), "some hunks did not apply");
    }
    match format {
        OutputFormat::Text => Ok(patched),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "text": patched,
            "applied": applied,
        }))?),
    }
}
