//! Fuzzy location of a pattern in a text (Bitap).

use std::collections::HashMap;

use super::diff::{find, rfind};

/// Longest pattern the bit-parallel matcher can handle.
pub const MATCH_MAX_BITS: usize = 32;

/// Score above which a candidate location is rejected (0.0 exact, 1.0 anything).
const MATCH_THRESHOLD: f64 = 0.5;

/// How far from the expected location a match may drift before the score
/// doubles its penalty, in characters.
const MATCH_DISTANCE: usize = 1000;

/// Finds the best location of `pattern` in `text` near `loc`.
pub fn match_main(text: &[char], pattern: &[char], loc: usize) -> Option<usize> {
    let loc = loc.min(text.len());
    if text == pattern {
        Some(0)
    } else if text.is_empty() {
        None
    } else if loc + pattern.len() <= text.len() && text[loc..loc + pattern.len()] == *pattern {
        Some(loc)
    } else {
        match_bitap(text, pattern, loc)
    }
}

#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn match_bitap(text: &[char], pattern: &[char], loc: usize) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > MATCH_MAX_BITS {
        return None;
    }
    let alphabet = alphabet(pattern);
    let pattern_len = pattern.len() as isize;
    let text_len = text.len() as isize;
    let loc = loc as isize;

    let score = |errors: isize, x: isize| -> f64 {
        let accuracy = errors as f64 / pattern_len as f64;
        let proximity = (loc - x).unsigned_abs();
        accuracy + proximity as f64 / MATCH_DISTANCE as f64
    };

    let mut threshold = MATCH_THRESHOLD;
    if let Some(exact) = find(text, pattern, loc as usize) {
        threshold = threshold.min(score(0, exact as isize));
        if let Some(exact) = rfind(text, pattern, (loc + pattern_len) as usize) {
            threshold = threshold.min(score(0, exact as isize));
        }
    }

    let match_mask: u64 = 1 << (pattern.len() - 1);
    let mut best_loc: isize = -1;
    let mut bin_max = pattern_len + text_len;
    let mut last_rd: Vec<u64> = Vec::new();

    for d in 0..pattern_len {
        // Binary search for how far from `loc` this error level can stray.
        let mut bin_min = 0;
        let mut bin_mid = bin_max;
        while bin_min < bin_mid {
            if score(d, loc + bin_mid) <= threshold {
                bin_min = bin_mid;
            } else {
                bin_max = bin_mid;
            }
            bin_mid = (bin_max - bin_min) / 2 + bin_min;
        }
        bin_max = bin_mid;

        let mut start = (loc - bin_mid + 1).max(1);
        let finish = (loc + bin_mid).min(text_len) + pattern_len;
        let mut rd = vec![0u64; (finish + 2) as usize];
        rd[(finish + 1) as usize] = (1u64 << d) - 1;

        let mut j = finish;
        while j >= start {
            let ju = j as usize;
            let char_match = if text_len <= j - 1 {
                0
            } else {
                alphabet.get(&text[ju - 1]).copied().unwrap_or(0)
            };
            rd[ju] = if d == 0 {
                ((rd[ju + 1] << 1) | 1) & char_match
            } else {
                (((rd[ju + 1] << 1) | 1) & char_match)
                    | (((last_rd[ju + 1] | last_rd[ju]) << 1) | 1)
                    | last_rd[ju + 1]
            };
            if rd[ju] & match_mask != 0 {
                let candidate = score(d, j - 1);
                if candidate <= threshold {
                    threshold = candidate;
                    best_loc = j - 1;
                    if best_loc > loc {
                        start = (2 * loc - best_loc).max(1);
                    } else {
                        break;
                    }
                }
            }
            j -= 1;
        }

        if score(d + 1, loc) > threshold {
            break;
        }
        last_rd = rd;
    }

    (best_loc >= 0).then_some(best_loc as usize)
}

/// Bit masks marking where each character occurs in the pattern.
fn alphabet(pattern: &[char]) -> HashMap<char, u64> {
    let mut masks = HashMap::new();
    for (i, c) in pattern.iter().enumerate() {
        *masks.entry(*c).or_insert(0) |= 1 << (pattern.len() - i - 1);
    }
    masks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn alphabet_masks() {
        let masks = alphabet(&chars("abc"));
        assert_eq!(masks[&'a'], 4);
        assert_eq!(masks[&'b'], 2);
        assert_eq!(masks[&'c'], 1);

        let masks = alphabet(&chars("abcaba"));
        assert_eq!(masks[&'a'], 37);
        assert_eq!(masks[&'b'], 18);
        assert_eq!(masks[&'c'], 8);
    }

    #[test]
    fn exact_and_shortcut_matches() {
        assert_eq!(match_main(&chars("abcdef"), &chars("abcdef"), 1000), Some(0));
        assert_eq!(match_main(&chars(""), &chars("abcdef"), 1), None);
        assert_eq!(match_main(&chars("abcdef"), &chars(""), 3), Some(3));
        assert_eq!(match_main(&chars("abcdef"), &chars("de"), 3), Some(3));
        assert_eq!(match_main(&chars("abcdef"), &chars("defy"), 4), Some(3));
    }

    #[test]
    fn fuzzy_matches() {
        assert_eq!(match_bitap(&chars("abcdefghijk"), &chars("fgh"), 5), Some(5));
        assert_eq!(match_bitap(&chars("abcdefghijk"), &chars("fgh"), 0), Some(5));
        assert_eq!(match_bitap(&chars("abcdefghijk"), &chars("efxhi"), 0), Some(4));
        assert_eq!(match_bitap(&chars("abcdefghijk"), &chars("cdefxyhijk"), 5), Some(2));
        assert_eq!(match_bitap(&chars("abcdefghijk"), &chars("bxy"), 1), None);
    }

    #[test]
    fn prefers_closest_candidate() {
        assert_eq!(match_bitap(&chars("abcdexyzabcde"), &chars("abccde"), 3), Some(0));
        assert_eq!(match_bitap(&chars("abcdexyzabcde"), &chars("abccde"), 5), Some(8));
    }
}
