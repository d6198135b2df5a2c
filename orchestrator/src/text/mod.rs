//! Lightweight text analysis shared by routing, recommendation, and summaries.
//!
//! Everything here is heuristic and deterministic: lowercase keyword sets,
//! frequency-ranked topics, and set-overlap measures.
//!
//! # Modules
//!
//! - [`entities`]: Mention, hashtag, URL, path, quoted-phrase, and proper-noun extraction

pub mod entities;

pub use entities::{extract_entities, merge_entities, EntityKind, ExtractedEntity};

use std::collections::{BTreeMap, BTreeSet};

/// Words too common to carry topical signal.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "yours", "all", "any", "can", "had",
    "has", "have", "her", "his", "him", "how", "its", "our", "out", "was", "were", "who", "why",
    "what", "when", "where", "which", "with", "this", "that", "these", "those", "there", "their",
    "them", "they", "then", "than", "from", "into", "onto", "about", "over", "under", "again",
    "also", "just", "some", "such", "very", "will", "would", "could", "should", "shall", "might",
    "must", "may", "been", "being", "did", "does", "doing", "done", "get", "got", "let", "lets",
    "let's", "make", "made", "more", "most", "much", "many", "need", "now", "off", "one", "only",
    "other", "own", "same", "see", "she", "too", "use", "used", "using", "want", "way", "well",
    "yes", "yet", "here", "each", "both", "few", "like", "please", "thanks", "thank", "okay",
    "back", "to", "of", "in", "on", "at", "by", "is", "it", "be", "as", "or", "an", "a", "i",
    "me", "my", "we", "us", "do", "so", "if", "no", "up", "go", "am", "he", "im", "i'm",
    "it's", "don't", "can't", "won't", "think", "know", "going", "really", "maybe", "thing",
    "things", "something", "anything", "everything", "switch",
];

/// Whether a lowercase word is a stopword.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercase word tokens (alphanumeric runs, apostrophes and inner hyphens kept).
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-' || c == '_'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Normalise a keyword: lowercase and strip a simple plural suffix.
pub fn normalize_keyword(word: &str) -> String {
    let w = word.to_lowercase();
    if w.len() > 4 && w.ends_with('s') && !w.ends_with("ss") && !w.ends_with("us") {
        w[..w.len() - 1].to_string()
    } else {
        w
    }
}

/// Ordered, de-duplicated content keywords of a text.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() >= 3 && !is_stopword(w))
        .map(|w| normalize_keyword(&w))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Keyword set of a text.
pub fn keyword_set(text: &str) -> BTreeSet<String> {
    keywords(text).into_iter().collect()
}

/// Most frequent keywords across a set of texts.
///
/// Ties are broken alphabetically so the result is stable.
pub fn extract_topics<'a, I>(texts: I, limit: usize) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts {
        for word in words(text) {
            if word.chars().count() < 4 || is_stopword(&word) {
                continue;
            }
            *counts.entry(normalize_keyword(&word)).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` (0.0 when both are empty).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Overlap relative to the larger set: `|A ∩ B| / max(|A|, |B|)`.
pub fn overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let denom = a.len().max(b.len());
    if denom == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / denom as f64
}

/// Number of elements shared by two sets.
pub fn shared_count(a: &BTreeSet<String>, b: &BTreeSet<String>) -> usize {
    a.intersection(b).count()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
