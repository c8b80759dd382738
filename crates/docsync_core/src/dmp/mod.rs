//! Character-level diff, match and patch for text values.
//!
//! Produces and applies patches in the `@@ -a,b +c,d @@` text format used by
//! `diffMatchPatch` operations. Patches are applied fuzzily: a hunk is
//! located near its expected offset even if the surrounding text has
//! drifted, and hunks that cannot be located are reported as failed rather
//! than aborting the whole application.

mod diff;
mod matching;
mod patch;

pub use diff::{diff_main, Diff, Operation};
pub use patch::{apply_patches, make_patches, parse_patches, patches_to_text, Patch};

use crate::error::CoreResult;

/// Parses `patch_text` and applies it to `text`.
///
/// Returns the patched text and, per hunk, whether it applied.
pub fn apply_patch_text(patch_text: &str, text: &str) -> CoreResult<(String, Vec<bool>)> {
    let patches = parse_patches(patch_text)?;
    Ok(apply_patches(&patches, text))
}

/// Renders the patch text turning `from` into `to`.
pub fn make_patch_text(from: &str, to: &str) -> String {
    patches_to_text(&make_patches(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_helpers_round_trip() {
        let patch = make_patch_text("hello world", "hello brave new world");
        let (text, results) = apply_patch_text(&patch, "hello world").unwrap();
        assert_eq!(text, "hello brave new world");
        assert!(results.iter().all(|ok| *ok));
    }

    #[test]
    fn identical_texts_produce_no_patch() {
        assert_eq!(make_patch_text("same", "same"), "");
        let (text, results) = apply_patch_text("", "unchanged").unwrap();
        assert_eq!(text, "unchanged");
        assert!(results.is_empty());
    }
}
