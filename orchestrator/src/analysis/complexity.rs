//! Complexity analysis: signal vector and discrete level from raw message text.
//!
//! Runs before model selection. Pure and deterministic: the same text and
//! vocabularies always produce the same analysis.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCED_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n`]*\n?(.*?)```").expect("FENCED_CODE_RE regex should compile")
});
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([^`\n]+)`").expect("INLINE_CODE_RE regex should compile")
});
static CODE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:fn |def |function |class |import |#include|let |const |var |pub |public |private |return |SELECT |for\s*\(|if\s*\(|while\s*\(|\}|\{)",
    )
    .expect("CODE_LINE_RE regex should compile")
});
static CONTROL_FLOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:if|else|elif|for|foreach|while|loop|match|switch|case|try|catch|except)\b")
        .expect("CONTROL_FLOW_RE regex should compile")
});
static FUNCTION_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:fn|def|function|func)\s+\w+|=>\s*\{|\blambda\b")
        .expect("FUNCTION_DEF_RE regex should compile")
});
static SEQUENCING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfirst\b.{0,200}\bthen\b").expect("SEQUENCING_RE regex should compile")
});

const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "api", "async", "backend", "cache", "closure", "compiler", "concurrency",
    "container", "database", "deadlock", "deployment", "docker", "encryption", "endpoint",
    "frontend", "function", "generic", "heap", "http", "index", "iterator", "json", "kubernetes",
    "latency", "lifetime", "memory", "microservice", "mutex", "network", "performance",
    "pointer", "protocol", "query", "recursion", "regex", "runtime", "schema", "server", "sql",
    "stack", "struct", "thread", "throughput", "trait", "compile", "kernel", "socket",
    "serialization", "benchmark", "refactor", "dependency",
];

const ABSTRACT_CONCEPTS: &[&str] = &[
    "abstraction", "architecture", "concept", "design pattern", "epistemology", "ethics",
    "framework", "implication", "maintainability", "methodology", "paradigm", "philosophy",
    "principle", "scalability", "strategy", "theory", "tradeoff", "trade-off", "meaning",
    "consciousness", "semantics",
];

const MULTI_STEP_CUES: &[&str] = &[
    "step by step", "step-by-step", "compare", "tradeoff", "trade-off", "pros and cons",
    "explain why", "analyze", "analyse", "evaluate", "walk me through", "reason about", "prove",
    "derive", "break down", "implications", "plan out", "root cause", "debug",
];

const CREATIVITY_CUES: &[&str] = &[
    "write a story", "story", "poem", "creative", "brainstorm", "imagine", "invent", "slogan",
    "lyrics", "fiction", "come up with", "ideas for", "tagline", "screenplay", "haiku",
];

const DATA_ANALYSIS_CUES: &[&str] = &[
    "analyze data", "analysis", "statistics", "statistical", "dataset", "data set", "csv",
    "spreadsheet", "chart", "trend", "correlation", "metrics", "average", "distribution",
    "regression", "compare",
];

const AMBIGUITY_CUES: &[&str] = &[
    "maybe", "something like", "not sure", "kind of", "sort of", "whatever", "somehow", "etc",
    "or something", "i guess", "stuff", "you know",
];

const ANAPHORA: &[&str] = &["it", "that", "this", "them", "those", "these"];

/// Discrete complexity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Trivial,
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl ComplexityLevel {
    /// All levels, lowest first.
    pub fn all() -> &'static [ComplexityLevel] {
        &[
            Self::Trivial,
            Self::Simple,
            Self::Moderate,
            Self::Complex,
            Self::Expert,
        ]
    }

    /// Whether this level warrants deliberate reasoning.
    pub fn is_demanding(self) -> bool {
        matches!(self, Self::Complex | Self::Expert)
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
            Self::Expert => write!(f, "expert"),
        }
    }
}

/// Raw signals detected in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexitySignals {
    pub code_presence: bool,
    /// 0.0–1.0
    pub code_complexity: f64,
    pub question_count: usize,
    pub technical_term_count: usize,
    pub abstract_concept_count: usize,
    pub multi_step_reasoning: bool,
    pub creativity_required: bool,
    pub data_analysis: bool,
    /// 0.0–1.0
    pub ambiguity: f64,
}

/// Full complexity analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAnalysis {
    pub signals: ComplexitySignals,
    /// Weighted score, clamped to 0.0–1.0.
    pub score: f64,
    pub level: ComplexityLevel,
}

impl ComplexityAnalysis {
    /// Compact summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "level={} score={:.2} code={} reasoning={} creative={}",
            self.level,
            self.score,
            self.signals.code_presence,
            self.signals.multi_step_reasoning,
            self.signals.creativity_required
        )
    }
}

/// Tunable weights and cut points for the complexity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
    /// Multiplier on code complexity.
    pub code: f64,
    /// Per technical term.
    pub technical_term: f64,
    pub technical_term_cap: f64,
    /// Per abstract concept.
    pub abstract_concept: f64,
    pub abstract_concept_cap: f64,
    pub multi_step_reasoning: f64,
    pub creativity: f64,
    pub data_analysis: f64,
    /// Multiplier on ambiguity.
    pub ambiguity: f64,
    /// Lower bounds of simple, moderate, complex, expert.
    pub level_thresholds: [f64; 4],
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            code: 0.3,
            technical_term: 0.05,
            technical_term_cap: 0.2,
            abstract_concept: 0.05,
            abstract_concept_cap: 0.15,
            multi_step_reasoning: 0.2,
            creativity: 0.15,
            data_analysis: 0.1,
            ambiguity: 0.1,
            level_thresholds: [0.15, 0.3, 0.5, 0.75],
        }
    }
}

impl ComplexityWeights {
    /// Map a score onto a level.
    pub fn level_for(&self, score: f64) -> ComplexityLevel {
        let [simple, moderate, complex, expert] = self.level_thresholds;
        if score >= expert {
            ComplexityLevel::Expert
        } else if score >= complex {
            ComplexityLevel::Complex
        } else if score >= moderate {
            ComplexityLevel::Moderate
        } else if score >= simple {
            ComplexityLevel::Simple
        } else {
            ComplexityLevel::Trivial
        }
    }
}

/// Complexity analyzer over fixed vocabularies.
#[derive(Debug, Clone, Default)]
pub struct ComplexityAnalyzer {
    weights: ComplexityWeights,
}

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ComplexityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ComplexityWeights {
        &self.weights
    }

    /// Analyze a message, optionally with recent history for reference resolution.
    pub fn analyze(&self, text: &str, history: &[&str]) -> ComplexityAnalysis {
        let signals = self.detect_signals(text, history);
        let score = self.score(&signals);
        ComplexityAnalysis {
            level: self.weights.level_for(score),
            signals,
            score,
        }
    }

    /// Detect raw signals without scoring.
    pub fn detect_signals(&self, text: &str, history: &[&str]) -> ComplexitySignals {
        let lower = text.to_lowercase();

        let code = extract_code(text);
        let code_presence = code.is_some();
        let code_complexity = code.as_deref().map(code_complexity).unwrap_or(0.0);

        let question_count = text.matches('?').count();
        let multi_step_reasoning = count_terms(&lower, MULTI_STEP_CUES) > 0
            || SEQUENCING_RE.is_match(text)
            || question_count >= 3;

        ComplexitySignals {
            code_presence,
            code_complexity,
            question_count,
            technical_term_count: count_terms(&lower, TECHNICAL_TERMS),
            abstract_concept_count: count_terms(&lower, ABSTRACT_CONCEPTS),
            multi_step_reasoning,
            creativity_required: count_terms(&lower, CREATIVITY_CUES) > 0,
            data_analysis: count_terms(&lower, DATA_ANALYSIS_CUES) > 0,
            ambiguity: ambiguity(&lower, history),
        }
    }

    /// Weighted combination of signals, clamped to 0.0–1.0.
    pub fn score(&self, s: &ComplexitySignals) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        if s.code_presence {
            score += s.code_complexity * w.code;
        }
        score += (s.technical_term_count as f64 * w.technical_term).min(w.technical_term_cap);
        score += (s.abstract_concept_count as f64 * w.abstract_concept).min(w.abstract_concept_cap);
        if s.multi_step_reasoning {
            score += w.multi_step_reasoning;
        }
        if s.creativity_required {
            score += w.creativity;
        }
        if s.data_analysis {
            score += w.data_analysis;
        }
        score += s.ambiguity.clamp(0.0, 1.0) * w.ambiguity;

        score.clamp(0.0, 1.0)
    }
}

/// Code carried by the message: fenced blocks first, then code-shaped lines.
fn extract_code(text: &str) -> Option<String> {
    let fenced: Vec<&str> = FENCED_CODE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if !fenced.is_empty() {
        return Some(fenced.join("\n"));
    }

    if CODE_LINE_RE.find_iter(text).count() >= 2 {
        return Some(text.to_string());
    }

    let symbolic_inline = INLINE_CODE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|s| s.contains(['(', '=', ':', '{', ';']))
        .collect::<Vec<_>>();
    if symbolic_inline.is_empty() {
        None
    } else {
        Some(symbolic_inline.join("\n"))
    }
}

/// Length, control-flow density, nesting depth, and function count, each capped.
fn code_complexity(code: &str) -> f64 {
    let lines: Vec<&str> = code.lines().filter(|l| !l.trim().is_empty()).collect();
    let line_count = lines.len().max(1) as f64;

    let length = (line_count / 50.0).min(0.2);

    let control_count = CONTROL_FLOW_RE.find_iter(code).count() as f64;
    let control = (control_count / line_count * 0.9).min(0.3);

    let depth = brace_depth(code).max(indent_depth(&lines));
    let nesting = (depth as f64 * 0.1).min(0.3);

    let functions = (FUNCTION_DEF_RE.find_iter(code).count() as f64 * 0.1).min(0.2);

    (length + control + nesting + functions).min(1.0)
}

fn brace_depth(code: &str) -> usize {
    let mut depth: usize = 0;
    let mut max_depth = 0;
    for c in code.chars() {
        match c {
            '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max_depth
}

/// Indentation-based depth for brace-less languages (4 spaces or a tab per level).
fn indent_depth(lines: &[&str]) -> usize {
    lines
        .iter()
        .map(|l| {
            let spaces = l.chars().take_while(|c| *c == ' ').count();
            let tabs = l.chars().take_while(|c| *c == '\t').count();
            spaces / 4 + tabs
        })
        .max()
        .unwrap_or(0)
}

fn ambiguity(lower: &str, history: &[&str]) -> f64 {
    let mut score = count_terms(lower, AMBIGUITY_CUES) as f64 * 0.25;

    let words = crate::text::words(lower);
    let dangling_reference =
        words.len() <= 6 && words.iter().any(|w| ANAPHORA.contains(&w.as_str()));
    if dangling_reference && history.is_empty() {
        score += 0.3;
    }
    score.min(1.0)
}

/// Number of distinct vocabulary terms present on word boundaries.
///
/// A trailing plural `s` on the haystack side still counts as a match.
pub(crate) fn count_terms(lower: &str, vocabulary: &[&str]) -> usize {
    vocabulary
        .iter()
        .filter(|term| contains_term(lower, term))
        .count()
}

pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(term) {
        let start = from + offset;
        let end = start + term.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end == bytes.len()
            || !is_word_byte(bytes[end])
            || (bytes[end] == b's' && (end + 1 == bytes.len() || !is_word_byte(bytes[end + 1])));
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
        while from < haystack.len() && !haystack.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_CODE: &str = "Can you compare the tradeoffs of this approach?\n\
```rust\n\
fn process(items: &[Item]) {\n\
    for item in items {\n\
        if item.active {\n\
            while item.pending() {\n\
                item.step();\n\
            }\n\
        }\n\
    }\n\
}\n\
```";

    #[test]
    fn test_greeting_is_trivial() {
        let a = ComplexityAnalyzer::new().analyze("hello there", &[]);
        assert_eq!(a.level, ComplexityLevel::Trivial);
        assert!(!a.signals.code_presence);
    }

    #[test]
    fn test_nested_code_with_tradeoffs_is_complex() {
        let a = ComplexityAnalyzer::new().analyze(NESTED_CODE, &[]);
        assert!(a.signals.code_presence);
        assert!(a.signals.multi_step_reasoning);
        assert!(a.signals.code_complexity > 0.7);
        assert!(a.level >= ComplexityLevel::Complex, "{}", a.summary());
    }

    #[test]
    fn test_creative_request_detected() {
        let a = ComplexityAnalyzer::new().analyze("write a poem about the sea", &[]);
        assert!(a.signals.creativity_required);
        assert!(a.level >= ComplexityLevel::Simple);
    }

    #[test]
    fn test_technical_terms_counted_with_plurals() {
        let s = ComplexityAnalyzer::new()
            .detect_signals("our databases hit a deadlock under async load", &[]);
        assert_eq!(s.technical_term_count, 3);
    }

    #[test]
    fn test_dangling_reference_is_ambiguous_without_history() {
        let analyzer = ComplexityAnalyzer::new();
        let alone = analyzer.detect_signals("fix it", &[]);
        let with_history = analyzer.detect_signals("fix it", &["the login form crashes"]);
        assert!(alone.ambiguity > with_history.ambiguity);
    }

    #[test]
    fn test_score_is_clamped() {
        let s = ComplexitySignals {
            code_presence: true,
            code_complexity: 1.0,
            question_count: 9,
            technical_term_count: 50,
            abstract_concept_count: 50,
            multi_step_reasoning: true,
            creativity_required: true,
            data_analysis: true,
            ambiguity: 1.0,
        };
        let score = ComplexityAnalyzer::new().score(&s);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_level_thresholds() {
        let w = ComplexityWeights::default();
        assert_eq!(w.level_for(0.0), ComplexityLevel::Trivial);
        assert_eq!(w.level_for(0.15), ComplexityLevel::Simple);
        assert_eq!(w.level_for(0.3), ComplexityLevel::Moderate);
        assert_eq!(w.level_for(0.5), ComplexityLevel::Complex);
        assert_eq!(w.level_for(0.75), ComplexityLevel::Expert);
    }

    #[test]
    fn test_contains_term_boundaries() {
        assert!(contains_term("the api is down", "api"));
        assert!(!contains_term("rapid growth", "api"));
        assert!(contains_term("two apis", "api"));
        assert!(!contains_term("apiary", "api"));
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let analyzer = ComplexityAnalyzer::new();
        assert_eq!(analyzer.analyze(NESTED_CODE, &[]), analyzer.analyze(NESTED_CODE, &[]));
    }
}
