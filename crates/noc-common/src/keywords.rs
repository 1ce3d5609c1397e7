//! Display keywords for result highlighting. Cosmetic only; the ranking
//! never reads these.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap());

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "this", "that", "with", "from", "will", "have", "has", "can",
        "our", "you", "your", "their", "they", "been", "also", "such", "other", "into", "more",
        "than", "some", "about",
    ]
    .into_iter()
    .collect()
});

const MAX_KEYWORDS: usize = 20;

/// Extracts highlight keywords: lowercase alphabetic tokens longer than
/// three characters, stopwords removed, first occurrence wins.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for hit in WORD.find_iter(&text.to_lowercase()) {
        let word = hit.as_str();
        if word.len() <= 3 || STOPWORDS.contains(word) {
            continue;
        }
        if seen.insert(word.to_string()) {
            keywords.push(word.to_string());
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
    }

    keywords
}
