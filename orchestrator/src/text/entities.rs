//! Entity extraction: regex-driven, no NLP model.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)>\]]+").expect("URL_RE regex should compile"));
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)@([A-Za-z0-9_][A-Za-z0-9_.-]*)").expect("MENTION_RE regex should compile")
});
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)#([A-Za-z][A-Za-z0-9_-]*)").expect("HASHTAG_RE regex should compile")
});
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)((?:\.{0,2}/)?(?:[\w.-]+/)+[\w.-]+\.[A-Za-z0-9]{1,6})\b")
        .expect("PATH_RE regex should compile")
});
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"\n]{2,60})"|`([^`\n]{2,60})`"#).expect("QUOTED_RE regex should compile")
});
static PROPER_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z0-9]+(?:\s+[A-Z][a-zA-Z0-9]+){0,2})\b")
        .expect("PROPER_NOUN_RE regex should compile")
});

/// Capitalised words that usually just start a sentence.
const SENTENCE_STARTERS: &[&str] = &[
    "i", "the", "a", "an", "this", "that", "these", "those", "what", "why", "how", "when",
    "where", "who", "which", "can", "could", "would", "should", "will", "please", "let", "lets",
    "hi", "hello", "hey", "thanks", "thank", "ok", "okay", "yes", "no", "also", "and", "but",
    "so", "now", "then", "is", "are", "do", "does", "did", "it", "we", "you", "my", "our",
    "switch", "go", "create", "add", "make", "show", "tell", "give", "remind", "if", "maybe",
    "good", "great", "sure", "bye", "goodbye",
];

/// Kind of extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// `@handle`
    Mention,
    /// `#tag`
    Hashtag,
    /// `http(s)://...`
    Url,
    /// `src/lib.rs`, `./docs/plan.md`
    FilePath,
    /// `"quoted phrase"` or `` `code span` ``
    Quoted,
    /// Capitalised name outside sentence-start position.
    ProperNoun,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mention => write!(f, "mention"),
            Self::Hashtag => write!(f, "hashtag"),
            Self::Url => write!(f, "url"),
            Self::FilePath => write!(f, "file_path"),
            Self::Quoted => write!(f, "quoted"),
            Self::ProperNoun => write!(f, "proper_noun"),
        }
    }
}

/// An entity found in message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    /// Text as written.
    pub value: String,
    /// Lowercased form used for matching.
    pub normalized: String,
}

impl ExtractedEntity {
    pub fn new(kind: EntityKind, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            normalized: value.trim().to_lowercase(),
        }
    }
}

/// Extract entities in order of first appearance, de-duplicated by normalised value.
pub fn extract_entities(text: &str) -> Vec<ExtractedEntity> {
    let mut found: Vec<(usize, ExtractedEntity)> = Vec::new();

    for m in URL_RE.find_iter(text) {
        found.push((m.start(), ExtractedEntity::new(EntityKind::Url, m.as_str())));
    }
    for caps in MENTION_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            found.push((m.start(), ExtractedEntity::new(EntityKind::Mention, m.as_str())));
        }
    }
    for caps in HASHTAG_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            found.push((m.start(), ExtractedEntity::new(EntityKind::Hashtag, m.as_str())));
        }
    }
    for caps in PATH_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            if !m.as_str().contains("://") && !inside_url(text, m.start()) {
                found.push((m.start(), ExtractedEntity::new(EntityKind::FilePath, m.as_str())));
            }
        }
    }
    for caps in QUOTED_RE.captures_iter(text) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            found.push((m.start(), ExtractedEntity::new(EntityKind::Quoted, m.as_str())));
        }
    }
    for m in PROPER_NOUN_RE.find_iter(text) {
        if let Some(candidate) = proper_noun(text, m.start(), m.as_str()) {
            found.push((m.start(), ExtractedEntity::new(EntityKind::ProperNoun, &candidate)));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    let mut seen = BTreeSet::new();
    found
        .into_iter()
        .map(|(_, e)| e)
        .filter(|e| seen.insert(e.normalized.clone()))
        .collect()
}

/// Append `incoming` entities not already present, keeping at most `limit`.
pub fn merge_entities(
    existing: &[ExtractedEntity],
    incoming: &[ExtractedEntity],
    limit: usize,
) -> Vec<ExtractedEntity> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    existing
        .iter()
        .chain(incoming.iter())
        .filter(|e| seen.insert(e.normalized.clone()))
        .take(limit)
        .cloned()
        .collect()
}

fn inside_url(text: &str, pos: usize) -> bool {
    URL_RE
        .find_iter(text)
        .any(|m| m.start() <= pos && pos < m.end())
}

/// Strip leading sentence-starter words; drop the match if nothing is left.
fn proper_noun(text: &str, start: usize, matched: &str) -> Option<String> {
    let at_sentence_start = text[..start]
        .trim_end()
        .chars()
        .last()
        .map_or(true, |c| matches!(c, '.' | '!' | '?' | '\n' | ':'));

    let mut parts: Vec<&str> = matched.split_whitespace().collect();
    while let Some(first) = parts.first() {
        let lower = first.to_lowercase();
        if SENTENCE_STARTERS.contains(&lower.as_str()) {
            parts.remove(0);
        } else {
            break;
        }
    }
    if parts.is_empty() {
        return None;
    }
    // A lone capitalised word at sentence start is usually just grammar.
    if parts.len() == 1 && at_sentence_start && parts[0] == matched {
        return None;
    }
    Some(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(entities: &[ExtractedEntity]) -> Vec<(EntityKind, String)> {
        entities
            .iter()
            .map(|e| (e.kind, e.normalized.clone()))
            .collect()
    }

    #[test]
    fn test_extracts_mentions_tags_urls() {
        let entities = extract_entities("ping @alice about #launch see https://example.com/plan");
        let k = kinds(&entities);
        assert!(k.contains(&(EntityKind::Mention, "alice".into())));
        assert!(k.contains(&(EntityKind::Hashtag, "launch".into())));
        assert!(k.contains(&(EntityKind::Url, "https://example.com/plan".into())));
    }

    #[test]
    fn test_extracts_paths_and_quotes() {
        let entities = extract_entities(r#"edit src/router/mod.rs and rename "kanban board""#);
        let k = kinds(&entities);
        assert!(k.contains(&(EntityKind::FilePath, "src/router/mod.rs".into())));
        assert!(k.contains(&(EntityKind::Quoted, "kanban board".into())));
    }

    #[test]
    fn test_proper_nouns_skip_sentence_starters() {
        let entities = extract_entities("Can you email Maria Lopez about the Postgres migration?");
        let k = kinds(&entities);
        assert!(k.contains(&(EntityKind::ProperNoun, "maria lopez".into())));
        assert!(k.contains(&(EntityKind::ProperNoun, "postgres".into())));
        assert!(!k.iter().any(|(_, v)| v == "can"));
    }

    #[test]
    fn test_lone_sentence_start_word_is_ignored() {
        let entities = extract_entities("Yesterday was long. Tomorrow too.");
        assert!(entities.is_empty());
    }

    #[test]
    fn test_merge_entities_dedupes_and_limits() {
        let a = vec![ExtractedEntity::new(EntityKind::ProperNoun, "Postgres")];
        let b = vec![
            ExtractedEntity::new(EntityKind::ProperNoun, "postgres"),
            ExtractedEntity::new(EntityKind::Mention, "bob"),
            ExtractedEntity::new(EntityKind::Mention, "carol"),
        ];
        let merged = merge_entities(&a, &b, 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value, "Postgres");
        assert_eq!(merged[1].normalized, "bob");
    }
}
