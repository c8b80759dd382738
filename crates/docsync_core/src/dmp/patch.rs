//! Patches: diffs with context, their text format and fuzzy application.

use std::fmt;

use super::diff::{
    cleanup_efficiency, cleanup_semantic, cleanup_semantic_lossless, diff_chars, diff_main,
    diff_text1, diff_text2, find, levenshtein, rfind, x_index, Diff, Operation,
};
use super::matching::{match_main, MATCH_MAX_BITS};
use crate::error::{CoreError, CoreResult};

/// Characters of context kept around each patch.
const PATCH_MARGIN: usize = 4;

/// Share of a large patch's text that may differ before it is rejected.
const PATCH_DELETE_THRESHOLD: f64 = 0.5;

/// A hunk of changes with surrounding context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    /// Fragments, including leading and trailing context.
    pub diffs: Vec<Diff>,
    /// Start in the source text.
    pub start1: usize,
    /// Start in the destination text.
    pub start2: usize,
    /// Length in the source text.
    pub length1: usize,
    /// Length in the destination text.
    pub length2: usize,
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{} +{} @@\n",
            coords(self.start1, self.length1),
            coords(self.start2, self.length2)
        )?;
        for diff in &self.diffs {
            let sign = match diff.operation {
                Operation::Insert => '+',
                Operation::Delete => '-',
                Operation::Equal => ' ',
            };
            writeln!(f, "{sign}{}", encode_uri(&diff.text))?;
        }
        Ok(())
    }
}

fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{length}", start + 1),
    }
}

/// Builds the patches that turn `text1` into `text2`.
pub fn make_patches(text1: &str, text2: &str) -> Vec<Patch> {
    let mut diffs = diff_main(text1, text2);
    if diffs.len() > 2 {
        cleanup_semantic(&mut diffs);
        cleanup_efficiency(&mut diffs);
    }
    let text1: Vec<char> = text1.chars().collect();
    patches_from_diffs(&text1, &diffs)
}

fn patches_from_diffs(text1: &[char], diffs: &[Diff]) -> Vec<Patch> {
    let mut patches = Vec::new();
    if diffs.is_empty() {
        return patches;
    }
    let mut patch = Patch::default();
    let mut char_count1 = 0;
    let mut char_count2 = 0;
    // Source text for the current patch, and the text with every patch so
    // far applied.
    let mut prepatch = text1.to_vec();
    let mut postpatch = text1.to_vec();

    for (x, diff) in diffs.iter().enumerate() {
        if patch.diffs.is_empty() && diff.operation != Operation::Equal {
            patch.start1 = char_count1;
            patch.start2 = char_count2;
        }
        match diff.operation {
            Operation::Insert => {
                patch.diffs.push(diff.clone());
                patch.length2 += diff.text.len();
                postpatch.splice(char_count2..char_count2, diff.text.iter().copied());
            }
            Operation::Delete => {
                patch.length1 += diff.text.len();
                patch.diffs.push(diff.clone());
                postpatch.drain(char_count2..char_count2 + diff.text.len());
            }
            Operation::Equal => {
                let len = diff.text.len();
                if len <= 2 * PATCH_MARGIN && !patch.diffs.is_empty() && x + 1 != diffs.len() {
                    patch.diffs.push(diff.clone());
                    patch.length1 += len;
                    patch.length2 += len;
                } else if len >= 2 * PATCH_MARGIN && !patch.diffs.is_empty() {
                    add_context(&mut patch, &prepatch);
                    patches.push(std::mem::take(&mut patch));
                    prepatch.clone_from(&postpatch);
                    char_count1 = char_count2;
                }
            }
        }
        if diff.operation != Operation::Insert {
            char_count1 += diff.text.len();
        }
        if diff.operation != Operation::Delete {
            char_count2 += diff.text.len();
        }
    }
    if !patch.diffs.is_empty() {
        add_context(&mut patch, &prepatch);
        patches.push(patch);
    }
    patches
}

/// Grows the context around a patch until its source text is unique.
fn add_context(patch: &mut Patch, text: &[char]) {
    if text.is_empty() {
        return;
    }
    let mut pattern = slice(text, patch.start2, patch.start2 + patch.length1);
    let mut padding = 0;
    while find(text, &pattern, 0) != rfind(text, &pattern, text.len())
        && pattern.len() < MATCH_MAX_BITS - 2 * PATCH_MARGIN
    {
        padding += PATCH_MARGIN;
        pattern = slice(
            text,
            patch.start2.saturating_sub(padding),
            patch.start2 + patch.length1 + padding,
        );
    }
    padding += PATCH_MARGIN;

    let prefix = slice(text, patch.start2.saturating_sub(padding), patch.start2);
    if !prefix.is_empty() {
        patch.diffs.insert(0, Diff::new(Operation::Equal, &prefix));
    }
    let suffix = slice(
        text,
        patch.start2 + patch.length1,
        patch.start2 + patch.length1 + padding,
    );
    if !suffix.is_empty() {
        patch.diffs.push(Diff::new(Operation::Equal, &suffix));
    }

    patch.start1 -= prefix.len();
    patch.start2 -= prefix.len();
    patch.length1 += prefix.len() + suffix.len();
    patch.length2 += prefix.len() + suffix.len();
}

/// Clamped sub-slice.
fn slice(text: &[char], start: usize, end: usize) -> Vec<char> {
    let end = end.min(text.len());
    let start = start.min(end);
    text[start..end].to_vec()
}

/// Applies patches to `text`, returning the new text and which patches applied.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn apply_patches(patches: &[Patch], text: &str) -> (String, Vec<bool>) {
    if patches.is_empty() {
        return (text.to_owned(), Vec::new());
    }
    let mut patches = patches.to_vec();
    let null_padding = add_padding(&mut patches);
    let mut text: Vec<char> = null_padding
        .iter()
        .chain(text.chars().collect::<Vec<_>>().iter())
        .chain(null_padding.iter())
        .copied()
        .collect();
    split_max(&mut patches);

    // Offset between where patches were expected and where they applied.
    let mut delta: isize = 0;
    let mut results = vec![false; patches.len()];
    for (x, patch) in patches.iter().enumerate() {
        let expected_loc = (patch.start2 as isize + delta).max(0) as usize;
        let text1 = diff_text1(&patch.diffs);
        let mut end_loc = None;
        let start_loc = if text1.len() > MATCH_MAX_BITS {
            match_main(&text, &text1[..MATCH_MAX_BITS], expected_loc).and_then(|start| {
                end_loc = match_main(
                    &text,
                    &text1[text1.len() - MATCH_MAX_BITS..],
                    expected_loc + text1.len() - MATCH_MAX_BITS,
                );
                match end_loc {
                    Some(end) if start < end => Some(start),
                    _ => None,
                }
            })
        } else {
            match_main(&text, &text1, expected_loc)
        };

        let Some(start_loc) = start_loc else {
            delta -= patch.length2 as isize - patch.length1 as isize;
            continue;
        };
        results[x] = true;
        delta = start_loc as isize - expected_loc as isize;
        let text2 = match end_loc {
            None => slice(&text, start_loc, start_loc + text1.len()),
            Some(end) => slice(&text, start_loc, end + MATCH_MAX_BITS),
        };

        if text1 == text2 {
            let end = (start_loc + text1.len()).min(text.len());
            text.splice(start_loc..end, diff_text2(&patch.diffs));
            continue;
        }

        let mut diffs = diff_chars(&text1, &text2, None);
        if text1.len() > MATCH_MAX_BITS
            && levenshtein(&diffs) as f64 / text1.len() as f64 > PATCH_DELETE_THRESHOLD
        {
            results[x] = false;
            continue;
        }
        cleanup_semantic_lossless(&mut diffs);
        let mut index1 = 0;
        for change in &patch.diffs {
            if change.operation != Operation::Equal {
                let index2 = x_index(&diffs, index1);
                let at = (start_loc + index2).min(text.len());
                match change.operation {
                    Operation::Insert => {
                        text.splice(at..at, change.text.iter().copied());
                    }
                    Operation::Delete => {
                        let end = (start_loc + x_index(&diffs, index1 + change.text.len()))
                            .min(text.len());
                        text.drain(at..end.max(at));
                    }
                    Operation::Equal => {}
                }
            }
            if change.operation != Operation::Delete {
                index1 += change.text.len();
            }
        }
    }

    let end = text.len().saturating_sub(null_padding.len());
    let start = null_padding.len().min(end);
    (text[start..end].iter().collect(), results)
}

/// Pads the edges of the patch list so edits at the very start or end of a
/// text can still be located.
fn add_padding(patches: &mut [Patch]) -> Vec<char> {
    let padding_length = PATCH_MARGIN;
    let null_padding: Vec<char> = (1..=padding_length)
        .filter_map(|i| u32::try_from(i).ok().and_then(char::from_u32))
        .collect();

    for patch in patches.iter_mut() {
        patch.start1 += padding_length;
        patch.start2 += padding_length;
    }

    if let Some(patch) = patches.first_mut() {
        let leading = patch
            .diffs
            .first()
            .filter(|d| d.operation == Operation::Equal)
            .map(|d| d.text.len());
        match leading {
            Some(len) if len < padding_length => {
                let extra = padding_length - len;
                let mut text = null_padding[len..].to_vec();
                text.extend_from_slice(&patch.diffs[0].text);
                patch.diffs[0].text = text;
                patch.start1 -= extra;
                patch.start2 -= extra;
                patch.length1 += extra;
                patch.length2 += extra;
            }
            Some(_) => {}
            None => {
                patch.diffs.insert(0, Diff::new(Operation::Equal, &null_padding));
                patch.start1 -= padding_length;
                patch.start2 -= padding_length;
                patch.length1 += padding_length;
                patch.length2 += padding_length;
            }
        }
    }

    if let Some(patch) = patches.last_mut() {
        let trailing = patch
            .diffs
            .last()
            .filter(|d| d.operation == Operation::Equal)
            .map(|d| d.text.len());
        match trailing {
            Some(len) if len < padding_length => {
                let extra = padding_length - len;
                if let Some(last) = patch.diffs.last_mut() {
                    last.text.extend_from_slice(&null_padding[..extra]);
                }
                patch.length1 += extra;
                patch.length2 += extra;
            }
            Some(_) => {}
            None => {
                patch.diffs.push(Diff::new(Operation::Equal, &null_padding));
                patch.length1 += padding_length;
                patch.length2 += padding_length;
            }
        }
    }

    null_padding
}

/// Splits patches whose source is longer than the matcher can locate.
fn split_max(patches: &mut Vec<Patch>) {
    let patch_size = MATCH_MAX_BITS;
    let mut x = 0;
    while x < patches.len() {
        if patches[x].length1 <= patch_size {
            x += 1;
            continue;
        }
        let mut big = patches.remove(x);
        let mut start1 = big.start1;
        let mut start2 = big.start2;
        let mut precontext: Vec<char> = Vec::new();

        while !big.diffs.is_empty() {
            let mut patch = Patch {
                start1: start1 - precontext.len(),
                start2: start2 - precontext.len(),
                ..Patch::default()
            };
            let mut empty = true;
            if !precontext.is_empty() {
                patch.length1 = precontext.len();
                patch.length2 = precontext.len();
                patch.diffs.push(Diff::new(Operation::Equal, &precontext));
            }

            while !big.diffs.is_empty() && patch.length1 < patch_size - PATCH_MARGIN {
                let operation = big.diffs[0].operation;
                let len = big.diffs[0].text.len();
                if operation == Operation::Insert {
                    patch.length2 += len;
                    start2 += len;
                    patch.diffs.push(big.diffs.remove(0));
                    empty = false;
                } else if operation == Operation::Delete
                    && patch.diffs.len() == 1
                    && patch.diffs[0].operation == Operation::Equal
                    && len > 2 * patch_size
                {
                    patch.length1 += len;
                    start1 += len;
                    empty = false;
                    patch.diffs.push(big.diffs.remove(0));
                } else {
                    let take = len.min(patch_size - patch.length1 - PATCH_MARGIN);
                    let text = big.diffs[0].text[..take].to_vec();
                    patch.length1 += take;
                    start1 += take;
                    if operation == Operation::Equal {
                        patch.length2 += take;
                        start2 += take;
                    } else {
                        empty = false;
                    }
                    patch.diffs.push(Diff::new(operation, &text));
                    if take == len {
                        big.diffs.remove(0);
                    } else {
                        big.diffs[0].text.drain(..take);
                    }
                }
            }

            let text2 = diff_text2(&patch.diffs);
            precontext = text2[text2.len().saturating_sub(PATCH_MARGIN)..].to_vec();
            let text1 = diff_text1(&big.diffs);
            let postcontext = &text1[..PATCH_MARGIN.min(text1.len())];
            if !postcontext.is_empty() {
                patch.length1 += postcontext.len();
                patch.length2 += postcontext.len();
                match patch.diffs.last_mut() {
                    Some(last) if last.operation == Operation::Equal => {
                        last.text.extend_from_slice(postcontext);
                    }
                    _ => patch.diffs.push(Diff::new(Operation::Equal, postcontext)),
                }
            }
            if !empty {
                patches.insert(x, patch);
                x += 1;
            }
        }
    }
}

/// Renders patches in the textual `@@ -a,b +c,d @@` format.
pub fn patches_to_text(patches: &[Patch]) -> String {
    patches.iter().map(ToString::to_string).collect()
}

/// Parses the textual patch format.
pub fn parse_patches(text: &str) -> CoreResult<Vec<Patch>> {
    let mut patches = Vec::new();
    if text.is_empty() {
        return Ok(patches);
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let mut pointer = 0;

    while pointer < lines.len() {
        let line = lines[pointer];
        if line.is_empty() {
            pointer += 1;
            continue;
        }
        let mut patch = parse_header(line)?;
        pointer += 1;

        while pointer < lines.len() {
            let line = lines[pointer];
            let mut chars = line.chars();
            let Some(sign) = chars.next() else {
                pointer += 1;
                continue;
            };
            if sign == '@' {
                break;
            }
            let body = decode_uri(chars.as_str())?;
            let operation = match sign {
                '-' => Operation::Delete,
                '+' => Operation::Insert,
                ' ' => Operation::Equal,
                other => {
                    return Err(CoreError::invalid_patch(format!(
                        "invalid patch mode '{other}' in: {line}"
                    )))
                }
            };
            patch.diffs.push(Diff::from_text(operation, &body));
            pointer += 1;
        }
        patches.push(patch);
    }
    Ok(patches)
}

fn parse_header(line: &str) -> CoreResult<Patch> {
    let invalid = || CoreError::invalid_patch(format!("invalid patch header: {line}"));
    let inner = line
        .strip_prefix("@@ -")
        .and_then(|rest| rest.strip_suffix(" @@"))
        .ok_or_else(invalid)?;
    let (source, destination) = inner.split_once(" +").ok_or_else(invalid)?;
    let (start1, length1) = parse_coords(source).ok_or_else(invalid)?;
    let (start2, length2) = parse_coords(destination).ok_or_else(invalid)?;
    Ok(Patch {
        diffs: Vec::new(),
        start1,
        start2,
        length1,
        length2,
    })
}

/// Parses `start` or `start,length` into a zero-based start and a length.
fn parse_coords(text: &str) -> Option<(usize, usize)> {
    let (start, length) = match text.split_once(',') {
        Some((start, length)) => (start.parse::<usize>().ok()?, Some(length)),
        None => (text.parse::<usize>().ok()?, None),
    };
    match length {
        None | Some("") => Some((start.checked_sub(1)?, 1)),
        Some("0") => Some((start, 0)),
        Some(length) => Some((start.checked_sub(1)?, length.parse().ok()?)),
    }
}

/// Characters left unescaped, matching the URI escaping used by the
/// patch text format.
fn is_uri_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || " ;,/?:@&=+$-_.!~*'()#".contains(c)
}

fn encode_uri(text: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut buffer = [0u8; 4];
    for &c in text {
        if is_uri_safe(c) {
            out.push(c);
        } else {
            for byte in c.encode_utf8(&mut buffer).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

fn decode_uri(text: &str) -> CoreResult<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = text
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| CoreError::invalid_patch(format!("illegal escape in: {text}")))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out)
        .map_err(|_| CoreError::invalid_patch(format!("illegal escape in: {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_text_format() {
        let text = "@@ -21,18 +22,17 @@\n jump\n-s\n+ed\n  over \n-the\n+a\n %0Alaz\n";
        let patches = parse_patches(text).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].start1, 20);
        assert_eq!(patches[0].length1, 18);
        assert_eq!(patches[0].start2, 21);
        assert_eq!(patches[0].length2, 17);
        assert_eq!(patches[0].diffs.len(), 7);
        assert_eq!(patches[0].diffs[6].text_string(), "\nlaz");
        assert_eq!(patches_to_text(&patches), text);
    }

    #[test]
    fn header_coordinates() {
        for text in [
            "@@ -1 +1 @@\n-a\n+b\n",
            "@@ -1,3 +0,0 @@\n-abc\n",
            "@@ -0,0 +1,3 @@\n+abc\n",
        ] {
            let patches = parse_patches(text).unwrap();
            assert_eq!(patches_to_text(&patches), text);
        }
    }

    #[test]
    fn invalid_patch_text() {
        assert!(parse_patches("Bad\nPatch\n").is_err());
        assert!(parse_patches("@@ -1 +1 @@\n*a\n").is_err());
        assert!(parse_patches("@@ -1 +1 @@\n+%ZZ\n").is_err());
        assert!(parse_patches("").unwrap().is_empty());
    }

    #[test]
    fn uri_escaping() {
        let text: Vec<char> = "a b\n%ü[]".chars().collect();
        let encoded = encode_uri(&text);
        assert_eq!(encoded, "a b%0A%25%C3%BC%5B%5D");
        assert_eq!(decode_uri(&encoded).unwrap(), "a b\n%ü[]");
    }

    #[test]
    fn make_patches_with_context() {
        let patches = make_patches(
            "The quick brown fox jumps over the lazy dog.",
            "That quick brown fox jumped over a lazy dog.",
        );
        assert_eq!(
            patches_to_text(&patches),
            "@@ -1,11 +1,12 @@\n Th\n-e\n+at\n  quick b\n@@ -21,18 +22,17 @@\n jump\n-s\n+ed\n  over \n-the\n+a\n  laz\n"
        );
        assert!(make_patches("", "").is_empty());
    }

    #[test]
    fn apply_exact_patches() {
        let source = "The quick brown fox jumps over the lazy dog.";
        let patches = make_patches(source, "That quick brown fox jumped over a lazy dog.");
        let (text, results) = apply_patches(&patches, source);
        assert_eq!(text, "That quick brown fox jumped over a lazy dog.");
        assert_eq!(results, vec![true, true]);
    }

    #[test]
    fn apply_fuzzy_patches() {
        let patches = make_patches(
            "The quick brown fox jumps over the lazy dog.",
            "That quick brown fox jumped over a lazy dog.",
        );
        let (text, results) = apply_patches(
            &patches,
            "The quick red rabbit jumps over the tired tiger.",
        );
        assert_eq!(text, "That quick red rabbit jumped over a tired tiger.");
        assert_eq!(results, vec![true, true]);

        let (text, results) = apply_patches(
            &patches,
            "I am the very model of a modern major general.",
        );
        assert_eq!(text, "I am the very model of a modern major general.");
        assert_eq!(results, vec![false, false]);
    }

    #[test]
    fn apply_at_edges() {
        let patches = make_patches("", "test");
        assert_eq!(apply_patches(&patches, "").0, "test");

        let patches = make_patches("XY", "XtestY");
        assert_eq!(apply_patches(&patches, "XY").0, "XtestY");

        let patches = make_patches("y", "y123");
        assert_eq!(apply_patches(&patches, "x").0, "x123");
    }

    #[test]
    fn apply_large_patch() {
        let source = "x1234567890123456789012345678901234567890123456789012345678901234567890y";
        let patches = make_patches(source, "xabcy");
        let (text, results) = apply_patches(&patches, source);
        assert_eq!(text, "xabcy");
        assert_eq!(results, vec![true, true]);
    }

    #[test]
    fn padding_wraps_edges() {
        let mut patches = make_patches("", "test");
        let padding = add_padding(&mut patches);
        assert_eq!(padding.len(), PATCH_MARGIN);
        assert_eq!(
            patches_to_text(&patches),
            "@@ -1,8 +1,12 @@\n %01%02%03%04\n+test\n %01%02%03%04\n"
        );
    }

    #[test]
    fn unicode_round_trip() {
        let source = "naïve café ✓ done";
        let target = "naïve coffee ✗ done";
        let patches = make_patches(source, target);
        let parsed = parse_patches(&patches_to_text(&patches)).unwrap();
        assert_eq!(apply_patches(&parsed, source).0, target);
    }
}
