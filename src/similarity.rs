//! Approximate comparison of observed command output against an expected reference.
//!
//! The score is the classic sequence-matcher ratio: the Ratcliff/Obershelp
//! alignment finds the longest common substring, then recurses into the pieces
//! on either side of it. With `M` characters matched in total the score is
//! `2 * M / (len(a) + len(b))`.
//!
//! [`check`] picks the comparison a [`CodeBlock`] asks for: a regular
//! expression when one is declared, a JSON comparison when the expected output
//! is tagged `json`, and the plain ratio otherwise.

use crate::block::CodeBlock;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

const MISMATCH_HEADER: &str =
    "The output is NOT correct. The remainder of the document may not function properly";

/// Similarity of two strings in `[0, 1]`; `1.0` means identical.
pub fn similarity(observed: &str, expected: &str) -> f64 {
    let a: Vec<char> = observed.chars().collect();
    let b: Vec<char> = expected.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * matching_chars(&a, &b)) as f64 / total as f64
}

/// An output check that failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// The score fell short of the threshold.
    Similarity { threshold: f64, score: f64 },
    /// The output did not match the declared pattern.
    Regex { pattern: String },
    /// JSON output was expected but the command printed something else.
    InvalidJson { error: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{MISMATCH_HEADER}")?;
        match self {
            Mismatch::Similarity { threshold, score } => {
                writeln!(f, "Expected Similarity - {threshold}")?;
                write!(f, "Similarity score is {score:.2}")
            }
            Mismatch::Regex { pattern } => write!(f, "Expected output to match - {pattern}"),
            Mismatch::InvalidJson { error } => write!(f, "Output is not valid JSON - {error}"),
        }
    }
}

/// Parse a threshold declared as text.
///
/// Values outside `[0, 1]` are accepted as-is; they are only logged.
pub fn parse_threshold(text: &str) -> Option<f64> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_nan() => {
            warn!(threshold = text, "similarity threshold is not a number");
            None
        }
        Ok(value) => {
            if !(0.0..=1.0).contains(&value) {
                warn!(threshold = value, "similarity threshold outside [0, 1]");
            }
            Some(value)
        }
        Err(_) => {
            warn!(threshold = text, "unparseable similarity threshold, skipping check");
            None
        }
    }
}

/// Compare `observed` against `expected` with a threshold given as text.
///
/// Returns the mismatch to report when the score is below the threshold.
/// An unparseable threshold skips the check.
pub fn verify(observed: &str, expected: &str, threshold: &str) -> Option<Mismatch> {
    verify_with(observed, expected, parse_threshold(threshold)?)
}

/// Compare `observed` against `expected` with an already parsed threshold.
pub fn verify_with(observed: &str, expected: &str, threshold: f64) -> Option<Mismatch> {
    let score = similarity(observed, expected);
    if score < threshold {
        warn!(threshold, score, "command output below expected similarity");
        Some(Mismatch::Similarity { threshold, score })
    } else {
        None
    }
}

/// Check `observed` against everything `code` declares about its output.
///
/// `default_threshold` applies when the block has expected output but no
/// similarity of its own. Returns `None` when nothing is declared.
pub fn check(observed: &str, code: &CodeBlock, default_threshold: f64) -> Option<Mismatch> {
    if let Some(pattern) = &code.expected_regex {
        return verify_regex(observed, pattern);
    }
    let expected = code.expected_output.as_deref()?;
    let threshold = match &code.expected_similarity {
        Some(text) => parse_threshold(text)?,
        None => default_threshold,
    };
    let is_json = code
        .expected_output_language
        .as_deref()
        .is_some_and(|lang| lang.eq_ignore_ascii_case("json"));
    if is_json {
        verify_json(observed, expected, threshold)
    } else {
        verify_with(observed, expected, threshold)
    }
}

/// Match `observed` against `pattern`. An invalid pattern skips the check.
pub fn verify_regex(observed: &str, pattern: &str) -> Option<Mismatch> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => {
            warn!(pattern, error = %err, "invalid expected_regex, skipping check");
            return None;
        }
    };
    if re.is_match(observed) {
        None
    } else {
        warn!(pattern, "command output does not match expected regex");
        Some(Mismatch::Regex {
            pattern: pattern.to_string(),
        })
    }
}

/// Compare two JSON documents.
///
/// Equal values always pass, whatever the formatting or key order. Otherwise
/// the compact serialisations are scored with [`similarity`]. An expected
/// reference that is not JSON itself falls back to the plain text ratio.
pub fn verify_json(observed: &str, expected: &str, threshold: f64) -> Option<Mismatch> {
    let expected_value: Value = match serde_json::from_str(expected) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "expected output is not valid JSON, comparing as text");
            return verify_with(observed, expected, threshold);
        }
    };
    let observed_value: Value = match serde_json::from_str(observed) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "command output is not valid JSON");
            return Some(Mismatch::InvalidJson {
                error: err.to_string(),
            });
        }
    };
    if observed_value == expected_value {
        return None;
    }
    debug!("JSON values differ, scoring compact forms");
    verify_with(
        &observed_value.to_string(),
        &expected_value.to_string(),
        threshold,
    )
}

/// Total length of the matching blocks found by the recursive alignment.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`, as `(i, j, len)`.
///
/// Ties resolve to the earliest start in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[col - 1] + 1;
                cur[col] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                cur[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}
