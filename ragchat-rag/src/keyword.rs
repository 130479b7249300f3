//! Keyword extraction and lexical matching over stored chunk text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::vectorstore::IndexSnapshot;

static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-zA-Z]{3,}\b").expect("unreachable error: invalid keyword regex")
});

/// Stop words dropped from search queries.
const QUERY_STOP_WORDS: [&str; 11] =
    ["the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for"];

/// Stop words dropped when summarizing a document's vocabulary.
const DOCUMENT_STOP_WORDS: [&str; 40] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "have", "has", "had", "this", "that",
    "these", "those", "it", "its", "not", "can", "will", "would", "should", "could", "which",
    "what", "when", "there",
];

/// Extract up to `max` distinct query keywords: lower-cased alphabetic tokens
/// of at least three letters, minus stop words, in order of first occurrence.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    for word in WORD.find_iter(&lowered).map(|m| m.as_str()) {
        if keywords.len() >= max {
            break;
        }
        if QUERY_STOP_WORDS.contains(&word) || keywords.iter().any(|k| k == word) {
            continue;
        }
        keywords.push(word.to_string());
    }
    keywords
}

/// The `max` most frequent keywords of `text`, using a wider stop-word list.
/// Ties keep first-occurrence order.
pub fn extract_frequent_keywords(text: &str, max: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in WORD.find_iter(&lowered).map(|m| m.as_str()) {
        if DOCUMENT_STOP_WORDS.contains(&word) {
            continue;
        }
        let count = counts.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    // sort_by is stable, so equal counts stay in first-occurrence order
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.into_iter().take(max).map(str::to_string).collect()
}

/// A stored chunk that contains at least one query keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalMatch {
    /// Position of the chunk in the scanned snapshot.
    pub index: usize,
    /// Number of distinct keywords the chunk contains.
    pub matched: usize,
}

/// Score every document in `snapshot` by how many distinct `keywords` it
/// contains (case-insensitive substring match) and keep the best `limit`.
///
/// Documents matching no keyword are dropped. Ties keep snapshot order.
pub fn lexical_scan(snapshot: &IndexSnapshot, keywords: &[String], limit: usize) -> Vec<LexicalMatch> {
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<LexicalMatch> = snapshot
        .documents
        .iter()
        .enumerate()
        .filter_map(|(index, document)| {
            let lowered = document.to_lowercase();
            let matched = keywords.iter().filter(|k| lowered.contains(k.as_str())).count();
            (matched > 0).then_some(LexicalMatch { index, matched })
        })
        .collect();

    matches.sort_by(|a, b| b.matched.cmp(&a.matched));
    matches.truncate(limit);
    matches
}
