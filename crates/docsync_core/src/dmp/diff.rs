//! Myers diff with cleanup passes.
//!
//! Texts are handled as slices of Unicode scalar values, so every offset and
//! length in this module counts `char`s.

use std::time::{Duration, Instant};

/// How long a single diff may spend bisecting before it settles for a
/// coarser (still valid) result.
pub const DIFF_TIMEOUT: Duration = Duration::from_secs(1);

/// Cost of an empty edit in [`cleanup_efficiency`], in characters.
const EDIT_COST: usize = 4;

/// Kind of a diff fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Text only in the source.
    Delete,
    /// Text only in the destination.
    Insert,
    /// Text in both.
    Equal,
}

/// One fragment of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// Kind of fragment.
    pub operation: Operation,
    /// Fragment text.
    pub text: Vec<char>,
}

impl Diff {
    /// Creates a fragment.
    pub fn new(operation: Operation, text: &[char]) -> Self {
        Self {
            operation,
            text: text.to_vec(),
        }
    }

    /// Creates a fragment from a string.
    pub fn from_text(operation: Operation, text: &str) -> Self {
        Self {
            operation,
            text: text.chars().collect(),
        }
    }

    /// Fragment text as a string.
    pub fn text_string(&self) -> String {
        self.text.iter().collect()
    }
}

/// Computes the differences between two strings.
pub fn diff_main(text1: &str, text2: &str) -> Vec<Diff> {
    let a: Vec<char> = text1.chars().collect();
    let b: Vec<char> = text2.chars().collect();
    diff_chars(&a, &b, Some(Instant::now() + DIFF_TIMEOUT))
}

/// Computes the differences between two char slices.
pub fn diff_chars(text1: &[char], text2: &[char], deadline: Option<Instant>) -> Vec<Diff> {
    if text1 == text2 {
        return if text1.is_empty() {
            Vec::new()
        } else {
            vec![Diff::new(Operation::Equal, text1)]
        };
    }

    let prefix_len = common_prefix(text1, text2);
    let prefix = &text1[..prefix_len];
    let (text1, text2) = (&text1[prefix_len..], &text2[prefix_len..]);

    let suffix_len = common_suffix(text1, text2);
    let suffix = &text1[text1.len() - suffix_len..];
    let (text1, text2) = (
        &text1[..text1.len() - suffix_len],
        &text2[..text2.len() - suffix_len],
    );

    let mut diffs = compute(text1, text2, deadline);
    if !prefix.is_empty() {
        diffs.insert(0, Diff::new(Operation::Equal, prefix));
    }
    if !suffix.is_empty() {
        diffs.push(Diff::new(Operation::Equal, suffix));
    }
    cleanup_merge(&mut diffs);
    diffs
}

fn compute(text1: &[char], text2: &[char], deadline: Option<Instant>) -> Vec<Diff> {
    if text1.is_empty() {
        return vec![Diff::new(Operation::Insert, text2)];
    }
    if text2.is_empty() {
        return vec![Diff::new(Operation::Delete, text1)];
    }

    let (long, short) = if text1.len() > text2.len() {
        (text1, text2)
    } else {
        (text2, text1)
    };
    if let Some(i) = find(long, short, 0) {
        let op = if text1.len() > text2.len() {
            Operation::Delete
        } else {
            Operation::Insert
        };
        return vec![
            Diff::new(op, &long[..i]),
            Diff::new(Operation::Equal, short),
            Diff::new(op, &long[i + short.len()..]),
        ];
    }
    if short.len() == 1 {
        return vec![
            Diff::new(Operation::Delete, text1),
            Diff::new(Operation::Insert, text2),
        ];
    }

    if deadline.is_some() {
        if let Some(hm) = half_match(text1, text2) {
            let mut diffs = diff_chars(&hm.text1_a, &hm.text2_a, deadline);
            diffs.push(Diff::new(Operation::Equal, &hm.common));
            diffs.extend(diff_chars(&hm.text1_b, &hm.text2_b, deadline));
            return diffs;
        }
    }

    bisect(text1, text2, deadline)
}

/// Finds the middle snake of the edit graph and recurses on both halves.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn bisect(text1: &[char], text2: &[char], deadline: Option<Instant>) -> Vec<Diff> {
    let len1 = text1.len() as isize;
    let len2 = text2.len() as isize;
    let max_d = (len1 + len2 + 1) / 2;
    let v_offset = max_d;
    let v_length = 2 * max_d;
    let mut v1 = vec![-1isize; v_length as usize];
    let mut v2 = vec![-1isize; v_length as usize];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;
    let delta = len1 - len2;
    // odd total length: the forward path overlaps the reverse one first
    let front = delta % 2 != 0;
    let (mut k1start, mut k1end, mut k2start, mut k2end) = (0isize, 0isize, 0isize, 0isize);

    for d in 0..max_d {
        if deadline.is_some_and(|deadline| Instant::now() > deadline) {
            break;
        }

        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let k1_offset = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                v1[k1_offset + 1]
            } else {
                v1[k1_offset - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < len1 && y1 < len2 && text1[x1 as usize] == text2[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;
            if x1 > len1 {
                k1end += 2;
            } else if y1 > len2 {
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if k2_offset >= 0 && k2_offset < v_length && v2[k2_offset as usize] != -1 {
                    let x2 = len1 - v2[k2_offset as usize];
                    if x1 >= x2 {
                        return bisect_split(text1, text2, x1 as usize, y1 as usize, deadline);
                    }
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let k2_offset = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                v2[k2_offset + 1]
            } else {
                v2[k2_offset - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < len1
                && y2 < len2
                && text1[(len1 - x2 - 1) as usize] == text2[(len2 - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;
            if x2 > len1 {
                k2end += 2;
            } else if y2 > len2 {
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if k1_offset >= 0 && k1_offset < v_length && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    if x1 >= len1 - x2 {
                        return bisect_split(text1, text2, x1 as usize, y1 as usize, deadline);
                    }
                }
            }
            k2 += 2;
        }
    }

    vec![
        Diff::new(Operation::Delete, text1),
        Diff::new(Operation::Insert, text2),
    ]
}

fn bisect_split(
    text1: &[char],
    text2: &[char],
    x: usize,
    y: usize,
    deadline: Option<Instant>,
) -> Vec<Diff> {
    let mut diffs = diff_chars(&text1[..x], &text2[..y], deadline);
    diffs.extend(diff_chars(&text1[x..], &text2[y..], deadline));
    diffs
}

struct HalfMatch {
    text1_a: Vec<char>,
    text1_b: Vec<char>,
    text2_a: Vec<char>,
    text2_b: Vec<char>,
    common: Vec<char>,
}

/// Looks for a substring shared by both texts that is at least half the
/// length of the longer one.
fn half_match(text1: &[char], text2: &[char]) -> Option<HalfMatch> {
    let (long, short) = if text1.len() > text2.len() {
        (text1, text2)
    } else {
        (text2, text1)
    };
    if long.len() < 4 || short.len() * 2 < long.len() {
        return None;
    }

    let hm1 = half_match_at(long, short, (long.len() + 3) / 4);
    let hm2 = half_match_at(long, short, (long.len() + 1) / 2);
    let hm = match (hm1, hm2) {
        (None, None) => return None,
        (Some(hm), None) | (None, Some(hm)) => hm,
        (Some(a), Some(b)) => {
            if a.common.len() > b.common.len() {
                a
            } else {
                b
            }
        }
    };

    if text1.len() > text2.len() {
        Some(hm)
    } else {
        Some(HalfMatch {
            text1_a: hm.text2_a,
            text1_b: hm.text2_b,
            text2_a: hm.text1_a,
            text2_b: hm.text1_b,
            common: hm.common,
        })
    }
}

/// Half-match seeded by the quarter of `long` starting at `i`. In the
/// result, `text1` is `long` and `text2` is `short`.
fn half_match_at(long: &[char], short: &[char], i: usize) -> Option<HalfMatch> {
    let seed = &long[i..i + long.len() / 4];
    let mut best: Option<HalfMatch> = None;
    let mut best_len = 0;
    let mut from = 0;

    while let Some(j) = find(short, seed, from) {
        let prefix_len = common_prefix(&long[i..], &short[j..]);
        let suffix_len = common_suffix(&long[..i], &short[..j]);
        if best_len < prefix_len + suffix_len {
            best_len = prefix_len + suffix_len;
            best = Some(HalfMatch {
                common: short[j - suffix_len..j + prefix_len].to_vec(),
                text1_a: long[..i - suffix_len].to_vec(),
                text1_b: long[i + prefix_len..].to_vec(),
                text2_a: short[..j - suffix_len].to_vec(),
                text2_b: short[j + prefix_len..].to_vec(),
            });
        }
        from = j + 1;
    }

    best.filter(|hm| hm.common.len() * 2 >= long.len())
}

/// Merges like fragments, factors shared affixes out of edit runs and
/// slides single edits over neighbouring equalities.
pub fn cleanup_merge(diffs: &mut Vec<Diff>) {
    diffs.push(Diff::new(Operation::Equal, &[]));
    let mut pointer = 0;
    let mut count_delete = 0;
    let mut count_insert = 0;
    let mut text_delete: Vec<char> = Vec::new();
    let mut text_insert: Vec<char> = Vec::new();

    while pointer < diffs.len() {
        match diffs[pointer].operation {
            Operation::Insert => {
                count_insert += 1;
                text_insert.extend_from_slice(&diffs[pointer].text);
                pointer += 1;
            }
            Operation::Delete => {
                count_delete += 1;
                text_delete.extend_from_slice(&diffs[pointer].text);
                pointer += 1;
            }
            Operation::Equal => {
                if count_delete + count_insert > 1 {
                    if count_delete != 0 && count_insert != 0 {
                        let common = common_prefix(&text_insert, &text_delete);
                        if common != 0 {
                            let x = pointer - count_delete - count_insert;
                            if x > 0 && diffs[x - 1].operation == Operation::Equal {
                                diffs[x - 1].text.extend_from_slice(&text_insert[..common]);
                            } else {
                                diffs.insert(0, Diff::new(Operation::Equal, &text_insert[..common]));
                                pointer += 1;
                            }
                            text_insert.drain(..common);
                            text_delete.drain(..common);
                        }
                        let common = common_suffix(&text_insert, &text_delete);
                        if common != 0 {
                            let tail = text_insert.split_off(text_insert.len() - common);
                            text_delete.truncate(text_delete.len() - common);
                            let mut text = tail;
                            text.extend_from_slice(&diffs[pointer].text);
                            diffs[pointer].text = text;
                        }
                    }
                    let start = pointer - count_delete - count_insert;
                    let mut merged = Vec::new();
                    if !text_delete.is_empty() {
                        merged.push(Diff::new(Operation::Delete, &text_delete));
                    }
                    if !text_insert.is_empty() {
                        merged.push(Diff::new(Operation::Insert, &text_insert));
                    }
                    let merged_len = merged.len();
                    diffs.splice(start..pointer, merged);
                    pointer = start + merged_len + 1;
                } else if pointer != 0 && diffs[pointer - 1].operation == Operation::Equal {
                    let text = diffs.remove(pointer).text;
                    diffs[pointer - 1].text.extend(text);
                } else {
                    pointer += 1;
                }
                count_insert = 0;
                count_delete = 0;
                text_delete.clear();
                text_insert.clear();
            }
        }
    }
    if diffs.last().is_some_and(|d| d.text.is_empty()) {
        diffs.pop();
    }

    // Second pass: single edits surrounded by equalities that can be
    // shifted sideways to eliminate one equality, e.g. A<ins>BA</ins>C.
    let mut changes = false;
    let mut pointer = 1;
    while pointer + 1 < diffs.len() {
        if diffs[pointer - 1].operation == Operation::Equal
            && diffs[pointer + 1].operation == Operation::Equal
        {
            let prev = diffs[pointer - 1].text.clone();
            let next = diffs[pointer + 1].text.clone();
            let current = diffs[pointer].text.clone();
            if current.ends_with(&prev) {
                let mut text = prev.clone();
                text.extend_from_slice(&current[..current.len() - prev.len()]);
                diffs[pointer].text = text;
                let mut text = prev;
                text.extend_from_slice(&next);
                diffs[pointer + 1].text = text;
                diffs.remove(pointer - 1);
                changes = true;
            } else if current.starts_with(&next) {
                diffs[pointer - 1].text.extend_from_slice(&next);
                let mut text = current[next.len()..].to_vec();
                text.extend_from_slice(&next);
                diffs[pointer].text = text;
                diffs.remove(pointer + 1);
                changes = true;
            }
        }
        pointer += 1;
    }
    if changes {
        cleanup_merge(diffs);
    }
}

/// Reduces the number of edits by eliminating semantically trivial equalities.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn cleanup_semantic(diffs: &mut Vec<Diff>) {
    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<Vec<char>> = None;
    let mut pointer: isize = 0;
    let (mut insertions1, mut deletions1, mut insertions2, mut deletions2) = (0, 0, 0, 0);

    while (pointer as usize) < diffs.len() {
        let index = pointer as usize;
        if diffs[index].operation == Operation::Equal {
            equalities.push(index);
            insertions1 = insertions2;
            deletions1 = deletions2;
            insertions2 = 0;
            deletions2 = 0;
            last_equality = Some(diffs[index].text.clone());
        } else {
            if diffs[index].operation == Operation::Insert {
                insertions2 += diffs[index].text.len();
            } else {
                deletions2 += diffs[index].text.len();
            }
            let eliminate = last_equality.as_ref().is_some_and(|equality| {
                !equality.is_empty()
                    && equality.len() <= insertions1.max(deletions1)
                    && equality.len() <= insertions2.max(deletions2)
            });
            if eliminate {
                if let (Some(equality), Some(&at)) = (last_equality.take(), equalities.last()) {
                    diffs.insert(at, Diff::new(Operation::Delete, &equality));
                    diffs[at + 1].operation = Operation::Insert;
                    equalities.pop();
                    equalities.pop();
                    pointer = equalities.last().map_or(-1, |&e| e as isize);
                    insertions1 = 0;
                    deletions1 = 0;
                    insertions2 = 0;
                    deletions2 = 0;
                    changes = true;
                }
            }
        }
        pointer += 1;
    }

    if changes {
        cleanup_merge(diffs);
    }
    cleanup_semantic_lossless(diffs);

    // Extract overlaps between a deletion and a following insertion,
    // e.g. <del>abcxxx</del><ins>xxxdef</ins> -> <del>abc</del>xxx<ins>def</ins>.
    let mut pointer = 1;
    while pointer < diffs.len() {
        if diffs[pointer - 1].operation == Operation::Delete
            && diffs[pointer].operation == Operation::Insert
        {
            let deletion = diffs[pointer - 1].text.clone();
            let insertion = diffs[pointer].text.clone();
            let overlap1 = common_overlap(&deletion, &insertion);
            let overlap2 = common_overlap(&insertion, &deletion);
            if overlap1 >= overlap2 {
                if overlap1 > 0
                    && (overlap1 as f64 >= deletion.len() as f64 / 2.0
                        || overlap1 as f64 >= insertion.len() as f64 / 2.0)
                {
                    diffs.insert(pointer, Diff::new(Operation::Equal, &insertion[..overlap1]));
                    diffs[pointer - 1].text = deletion[..deletion.len() - overlap1].to_vec();
                    diffs[pointer + 1].text = insertion[overlap1..].to_vec();
                    pointer += 1;
                }
            } else if overlap2 > 0
                && (overlap2 as f64 >= deletion.len() as f64 / 2.0
                    || overlap2 as f64 >= insertion.len() as f64 / 2.0)
            {
                diffs.insert(pointer, Diff::new(Operation::Equal, &deletion[..overlap2]));
                diffs[pointer - 1] =
                    Diff::new(Operation::Insert, &insertion[..insertion.len() - overlap2]);
                diffs[pointer + 1] = Diff::new(Operation::Delete, &deletion[overlap2..]);
                pointer += 1;
            }
            pointer += 1;
        }
        pointer += 1;
    }
}

/// Slides single edits between equalities to word and line boundaries.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn cleanup_semantic_lossless(diffs: &mut Vec<Diff>) {
    let mut pointer: isize = 1;
    while (pointer as usize) + 1 < diffs.len() {
        let p = pointer as usize;
        if diffs[p - 1].operation == Operation::Equal && diffs[p + 1].operation == Operation::Equal {
            let mut equality1 = diffs[p - 1].text.clone();
            let mut edit = diffs[p].text.clone();
            let mut equality2 = diffs[p + 1].text.clone();

            let common = common_suffix(&equality1, &edit);
            if common > 0 {
                let shared = edit[edit.len() - common..].to_vec();
                equality1.truncate(equality1.len() - common);
                let mut shifted = shared.clone();
                shifted.extend_from_slice(&edit[..edit.len() - common]);
                edit = shifted;
                let mut after = shared;
                after.extend_from_slice(&equality2);
                equality2 = after;
            }

            let mut best_equality1 = equality1.clone();
            let mut best_edit = edit.clone();
            let mut best_equality2 = equality2.clone();
            let mut best_score = semantic_score(&equality1, &edit) + semantic_score(&edit, &equality2);
            while !edit.is_empty() && !equality2.is_empty() && edit[0] == equality2[0] {
                equality1.push(edit[0]);
                edit.remove(0);
                edit.push(equality2.remove(0));
                let score = semantic_score(&equality1, &edit) + semantic_score(&edit, &equality2);
                if score >= best_score {
                    best_score = score;
                    best_equality1 = equality1.clone();
                    best_edit = edit.clone();
                    best_equality2 = equality2.clone();
                }
            }

            if diffs[p - 1].text != best_equality1 {
                let mut p = p;
                if best_equality1.is_empty() {
                    diffs.remove(p - 1);
                    p -= 1;
                    pointer -= 1;
                } else {
                    diffs[p - 1].text = best_equality1;
                }
                diffs[p].text = best_edit;
                if best_equality2.is_empty() {
                    diffs.remove(p + 1);
                    pointer -= 1;
                } else {
                    diffs[p + 1].text = best_equality2;
                }
            }
        }
        pointer = (pointer + 1).max(1);
    }
}

/// Reduces the number of edits by eliminating operationally trivial equalities.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn cleanup_efficiency(diffs: &mut Vec<Diff>) {
    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<Vec<char>> = None;
    let mut pointer: isize = 0;
    let (mut pre_ins, mut pre_del, mut post_ins, mut post_del) = (false, false, false, false);

    while (pointer as usize) < diffs.len() {
        let index = pointer as usize;
        if diffs[index].operation == Operation::Equal {
            if diffs[index].text.len() < EDIT_COST && (post_ins || post_del) {
                equalities.push(index);
                pre_ins = post_ins;
                pre_del = post_del;
                last_equality = Some(diffs[index].text.clone());
            } else {
                equalities.clear();
                last_equality = None;
            }
            post_ins = false;
            post_del = false;
        } else {
            if diffs[index].operation == Operation::Delete {
                post_del = true;
            } else {
                post_ins = true;
            }
            let flags = [pre_ins, pre_del, post_ins, post_del]
                .iter()
                .filter(|&&f| f)
                .count();
            let eliminate = last_equality.as_ref().is_some_and(|equality| {
                !equality.is_empty()
                    && ((pre_ins && pre_del && post_ins && post_del)
                        || (equality.len() < EDIT_COST / 2 && flags == 3))
            });
            if eliminate {
                if let (Some(equality), Some(&at)) = (last_equality.take(), equalities.last()) {
                    diffs.insert(at, Diff::new(Operation::Delete, &equality));
                    diffs[at + 1].operation = Operation::Insert;
                    equalities.pop();
                    if pre_ins && pre_del {
                        post_ins = true;
                        post_del = true;
                        equalities.clear();
                    } else {
                        equalities.pop();
                        pointer = equalities.last().map_or(-1, |&e| e as isize);
                        post_ins = false;
                        post_del = false;
                    }
                    changes = true;
                }
            }
        }
        pointer += 1;
    }

    if changes {
        cleanup_merge(diffs);
    }
}

/// Scores the boundary between two texts: 6 for an edge, 5 for a blank
/// line, down to 0 for the middle of a word.
fn semantic_score(one: &[char], two: &[char]) -> u32 {
    let (Some(&char1), Some(&char2)) = (one.last(), two.first()) else {
        return 6;
    };
    let non_alnum1 = !char1.is_ascii_alphanumeric();
    let non_alnum2 = !char2.is_ascii_alphanumeric();
    let whitespace1 = non_alnum1 && char1.is_whitespace();
    let whitespace2 = non_alnum2 && char2.is_whitespace();
    let line_break1 = whitespace1 && (char1 == '\r' || char1 == '\n');
    let line_break2 = whitespace2 && (char2 == '\r' || char2 == '\n');
    let blank_line1 = line_break1 && (one.ends_with(&['\n', '\n']) || one.ends_with(&['\n', '\r', '\n']));
    let blank_line2 = line_break2
        && (two.starts_with(&['\n', '\n'])
            || two.starts_with(&['\r', '\n', '\n'])
            || two.starts_with(&['\n', '\r', '\n'])
            || two.starts_with(&['\r', '\n', '\r', '\n']));

    if blank_line1 || blank_line2 {
        5
    } else if line_break1 || line_break2 {
        4
    } else if non_alnum1 && !whitespace1 && whitespace2 {
        3
    } else if whitespace1 || whitespace2 {
        2
    } else if non_alnum1 || non_alnum2 {
        1
    } else {
        0
    }
}

/// Length of the common prefix.
pub fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Length of the common suffix.
pub fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Length of the longest suffix of `a` that is a prefix of `b`.
fn common_overlap(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (a, b) = if a.len() > b.len() {
        (&a[a.len() - b.len()..], b)
    } else {
        (a, &b[..a.len()])
    };
    let text_length = a.len();
    if a == b {
        return text_length;
    }

    let mut best = 0;
    let mut length = 1;
    loop {
        let pattern = &a[text_length - length..];
        let Some(found) = find(b, pattern, 0) else {
            return best;
        };
        length += found;
        if found == 0 || a[text_length - length..] == b[..length] {
            best = length;
            length += 1;
        }
        if length > text_length {
            return best;
        }
    }
}

/// First index at or after `from` where `needle` occurs in `haystack`.
pub fn find(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// Last index at or before `from` where `needle` occurs in `haystack`.
pub fn rfind(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    let last_start = from.min(haystack.len() - needle.len());
    (0..=last_start)
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Source text of a diff (equalities and deletions).
pub fn diff_text1(diffs: &[Diff]) -> Vec<char> {
    diffs
        .iter()
        .filter(|d| d.operation != Operation::Insert)
        .flat_map(|d| d.text.iter().copied())
        .collect()
}

/// Destination text of a diff (equalities and insertions).
pub fn diff_text2(diffs: &[Diff]) -> Vec<char> {
    diffs
        .iter()
        .filter(|d| d.operation != Operation::Delete)
        .flat_map(|d| d.text.iter().copied())
        .collect()
}

/// Maps a location in the source text to the destination text.
pub fn x_index(diffs: &[Diff], loc: usize) -> usize {
    let (mut chars1, mut chars2) = (0, 0);
    let (mut last_chars1, mut last_chars2) = (0, 0);
    let mut found = None;
    for diff in diffs {
        if diff.operation != Operation::Insert {
            chars1 += diff.text.len();
        }
        if diff.operation != Operation::Delete {
            chars2 += diff.text.len();
        }
        if chars1 > loc {
            found = Some(diff);
            break;
        }
        last_chars1 = chars1;
        last_chars2 = chars2;
    }
    if found.is_some_and(|d| d.operation == Operation::Delete) {
        return last_chars2;
    }
    last_chars2 + (loc - last_chars1)
}

/// Number of inserted, deleted or substituted characters.
pub fn levenshtein(diffs: &[Diff]) -> usize {
    let (mut total, mut insertions, mut deletions) = (0, 0, 0);
    for diff in diffs {
        match diff.operation {
            Operation::Insert => insertions += diff.text.len(),
            Operation::Delete => deletions += diff.text.len(),
            Operation::Equal => {
                total += insertions.max(deletions);
                insertions = 0;
                deletions = 0;
            }
        }
    }
    total + insertions.max(deletions)
}
