//! Keyword excerpts and keyword-density scoring.

use std::cmp::Reverse;
use std::collections::HashSet;

use regex::Regex;

/// Default number of characters kept on each side of a keyword hit.
pub const DEFAULT_WINDOW: usize = 160;

/// Maximum number of excerpts returned.
pub const MAX_EXCERPTS: usize = 5;

/// Excerpts sharing this many leading characters (case-folded) are duplicates.
const DEDUP_PREFIX_CHARS: usize = 50;

/// Terms that push an excerpt up the ranking.
const THREAT_TERMS: &[&str] = &[
    "hack", "breach", "dump", "leak", "stolen", "illegal", "market", "sell", "buy",
];

/// Case-insensitive matcher for a keyword.
///
/// Whitespace inside the keyword matches any whitespace run, so a phrase
/// split over a line break is still found.
fn keyword_regex(keyword: &str) -> Option<Regex> {
    let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    Regex::new(&format!("(?i){}", words.join(r"\s+"))).ok()
}

/// Return up to five excerpts around occurrences of `keyword` in `text`.
///
/// Each excerpt is `window` characters either side of the hit, whitespace
/// collapsed, with every occurrence wrapped in `**`. Excerpts are ranked by
/// how many threat terms they contain; ties keep document order.
pub fn find_keyword_context(text: &str, keyword: &str, window: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let Some(re) = keyword_regex(keyword) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut excerpts = Vec::new();
    for m in re.find_iter(text) {
        let start = back_chars(text, m.start(), window);
        let end = forward_chars(text, m.end(), window);
        let context = text[start..end]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let highlighted = re.replace_all(&context, "**${0}**").into_owned();

        let key: String = highlighted
            .chars()
            .take(DEDUP_PREFIX_CHARS)
            .collect::<String>()
            .to_lowercase();
        if seen.insert(key) {
            excerpts.push(highlighted);
        }
    }

    excerpts.sort_by_key(|e| Reverse(threat_score(e)));
    excerpts.truncate(MAX_EXCERPTS);
    excerpts
}

/// Keyword density: occurrences per 10,000 characters, rounded to 4 places.
///
/// Zero when the keyword or the text is empty.
pub fn relevance_score(text: &str, keyword: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let Some(re) = keyword_regex(keyword) else {
        return 0.0;
    };
    let hits = re.find_iter(text).count() as f64;
    let length = text.chars().count().max(1) as f64;
    (hits / length * 10_000.0 * 10_000.0).round() / 10_000.0
}

fn threat_score(excerpt: &str) -> usize {
    let lower = excerpt.to_lowercase();
    THREAT_TERMS.iter().filter(|t| lower.contains(*t)).count()
}

/// Byte offset `n` characters before `idx`, clamped to the start.
fn back_chars(text: &str, idx: usize, n: usize) -> usize {
    if n == 0 {
        return idx;
    }
    text[..idx]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte offset `n` characters after `idx`, clamped to the end.
fn forward_chars(text: &str, idx: usize, n: usize) -> usize {
    text[idx..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| idx + i)
        .unwrap_or(text.len())
}
