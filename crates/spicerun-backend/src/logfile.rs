//! Simulator log excerpts.

use std::path::Path;

use crate::text::TextFormat;

/// Number of trailing log lines kept in an excerpt.
pub const EXCERPT_LINES: usize = 40;

/// Upper bound on excerpt size in bytes.
pub const EXCERPT_MAX_BYTES: usize = 4096;

/// Reads the tail of a log file. A missing or unreadable log yields an empty
/// excerpt.
pub fn excerpt(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => tail(&TextFormat::decode(&bytes).0, EXCERPT_LINES, EXCERPT_MAX_BYTES),
        Err(_) => String::new(),
    }
}

/// Keeps the last `lines` non-empty lines of `text`, then trims from the
/// front until at most `max_bytes` remain.
pub fn tail(text: &str, lines: usize, max_bytes: usize) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end_matches(['\r', '\0']))
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    let joined = kept[start..].join("\n");
    if joined.len() <= max_bytes {
        return joined;
    }
    let mut cut = joined.len() - max_bytes;
    while !joined.is_char_boundary(cut) {
        cut += 1;
    }
    joined[cut..].to_string()
}
