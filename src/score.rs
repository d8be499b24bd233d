//! Query-to-place-name match scoring.
//!
//! Word overlap only, no edit distance: "Louvre Musuem" does not match "Louvre
//! Museum" on the second word. Misses become clarifications instead of wrong places.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "in", "at", "to", "of", "for", "on", "near",
];

/// Score how well `candidate_name` matches `query`, in `[0, 1]`.
///
/// - exact match (case-insensitive, trimmed): `1.0`
/// - name contains the query: `0.95`
/// - otherwise the fraction of significant query words found in the name
pub fn score(query: &str, candidate_name: &str) -> f64 {
    let query = query.trim().to_lowercase();
    let name = candidate_name.trim().to_lowercase();

    if query.is_empty() {
        return 0.0;
    }
    if query == name {
        return 1.0;
    }
    if name.contains(&query) {
        return 0.95;
    }

    let query_tokens = significant_tokens(&query);
    if query_tokens.is_empty() {
        return 0.0;
    }

    let name_tokens: HashSet<&str> = significant_tokens(&name).into_iter().collect();
    let hits = query_tokens
        .iter()
        .filter(|token| name_tokens.contains(*token))
        .count();

    hits as f64 / query_tokens.len() as f64
}

fn significant_tokens(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .filter(|token| !STOP_WORDS.contains(token))
        .collect()
}
