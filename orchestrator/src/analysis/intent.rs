//! Intent classification: ranked intents from pattern and keyword matching.
//!
//! Heuristic only. Each intent type has a set of regex patterns and a keyword
//! vocabulary; a regex hit is worth 0.8, keyword density at most 0.6, and the
//! better of the two is scaled by the intent's priority.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::{extract_entities, words, ExtractedEntity};

/// Confidence contributed by any regex match.
const PATTERN_CONFIDENCE: f64 = 0.8;
/// Ceiling on the keyword-density contribution.
const KEYWORD_CAP: f64 = 0.6;
/// Keyword hits per word are multiplied by this before capping.
const KEYWORD_DENSITY_SCALE: f64 = 4.0;
/// Confidence of the fallback `Information` intent.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Closed set of message intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    TaskCreation,
    ContextSwitch,
    Question,
    Command,
    Request,
    Clarification,
    Feedback,
    Information,
    Greeting,
    Farewell,
}

impl IntentType {
    pub fn all() -> &'static [IntentType] {
        &[
            Self::TaskCreation,
            Self::ContextSwitch,
            Self::Question,
            Self::Command,
            Self::Request,
            Self::Clarification,
            Self::Feedback,
            Self::Information,
            Self::Greeting,
            Self::Farewell,
        ]
    }

    /// Pattern priority weight (2–9).
    pub fn priority(self) -> u8 {
        match self {
            Self::ContextSwitch => 9,
            Self::TaskCreation => 8,
            Self::Command => 7,
            Self::Request => 6,
            Self::Question => 5,
            Self::Clarification => 5,
            Self::Feedback => 4,
            Self::Greeting => 3,
            Self::Farewell => 3,
            Self::Information => 2,
        }
    }

    fn patterns(self) -> &'static [Regex] {
        match self {
            Self::TaskCreation => &TASK_CREATION_PATTERNS,
            Self::ContextSwitch => &CONTEXT_SWITCH_PATTERNS,
            Self::Question => &QUESTION_PATTERNS,
            Self::Command => &COMMAND_PATTERNS,
            Self::Request => &REQUEST_PATTERNS,
            Self::Clarification => &CLARIFICATION_PATTERNS,
            Self::Feedback => &FEEDBACK_PATTERNS,
            Self::Information => &INFORMATION_PATTERNS,
            Self::Greeting => &GREETING_PATTERNS,
            Self::Farewell => &FAREWELL_PATTERNS,
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::TaskCreation => &["task", "todo", "remind", "deadline", "schedule", "ticket", "due"],
            Self::ContextSwitch => &["switch", "back", "resume", "return", "topic"],
            Self::Question => &["what", "why", "how", "when", "where", "who", "which"],
            Self::Command => &["run", "execute", "deploy", "delete", "stop", "start", "restart", "enable", "disable"],
            Self::Request => &["please", "help", "need", "want", "could"],
            Self::Clarification => &["mean", "meant", "clarify", "actually", "rather", "instead"],
            Self::Feedback => &["great", "wrong", "perfect", "good", "bad", "works", "broken", "love", "hate"],
            Self::Information => &["fyi", "note", "update", "info"],
            Self::Greeting => &["hi", "hello", "hey", "morning"],
            Self::Farewell => &["bye", "goodbye", "later", "night"],
        }
    }
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TaskCreation => "task_creation",
            Self::ContextSwitch => "context_switch",
            Self::Question => "question",
            Self::Command => "command",
            Self::Request => "request",
            Self::Clarification => "clarification",
            Self::Feedback => "feedback",
            Self::Information => "information",
            Self::Greeting => "greeting",
            Self::Farewell => "farewell",
        };
        write!(f, "{s}")
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("intent pattern should compile"))
        .collect()
}

static TASK_CREATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(?:remind me to|add (?:a )?task|create (?:a )?(?:task|todo|ticket)|don't let me forget)\b",
        r"(?i)^\s*todo:",
        r"(?i)\bi need to\b.+\b(?:by|before|tomorrow|today|tonight)\b",
    ])
});
static CONTEXT_SWITCH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(?:switch|go back|get back|return|move|jump) to\b",
        r"(?i)\b(?:back to|continue with|continue on|resume)\b",
        r"(?i)\blet'?s (?:talk about|discuss|get back to)\b",
    ])
});
static QUESTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\?\s*$",
        r"(?i)^\s*(?:what|why|how|when|where|who|which|is|are|does|do|should)\b",
    ])
});
static COMMAND_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)^\s*(?:run|execute|deploy|delete|stop|start|restart|open|close|show|list|set|enable|disable|install)\b",
        r"^\s*/\w+",
    ])
});
static REQUEST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"(?i)\b(?:can you|could you|would you|please|i'd like|i would like|help me)\b"])
});
static CLARIFICATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(?:what do you mean|i meant|to clarify|in other words|i mean|could you clarify|not what i)\b",
    ])
});
static FEEDBACK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(?:that's (?:great|wrong|perfect|not right)|good job|well done|this is wrong|doesn't work|works now|thanks? for)\b",
    ])
});
static INFORMATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"(?i)\b(?:fyi|for your information|note that|just so you know|heads up)\b"])
});
static GREETING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"(?i)^\s*(?:hi|hello|hey|good (?:morning|afternoon|evening)|greetings)\b"])
});
static FAREWELL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"(?i)\b(?:bye|goodbye|see you|talk later|good night|signing off)\b"])
});

/// One classified intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub intent_type: IntentType,
    /// 0.0–1.0
    pub confidence: f64,
    pub entities: Vec<ExtractedEntity>,
    pub original_text: String,
}

/// Stateless intent classifier over fixed pattern tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// All matching intents, highest confidence first.
    ///
    /// Never empty: falls back to `Information` at 0.3.
    pub fn classify(&self, text: &str) -> Vec<ClassifiedIntent> {
        let tokens = words(text);
        let entities = extract_entities(text);

        let mut scored: Vec<(IntentType, f64)> = IntentType::all()
            .iter()
            .filter_map(|&intent| {
                let confidence = score_intent(intent, text, &tokens);
                (confidence > 0.0).then_some((intent, confidence))
            })
            .collect();

        if scored.is_empty() {
            scored.push((IntentType::Information, FALLBACK_CONFIDENCE));
        }

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.0.priority().cmp(&a.0.priority()))
                .then_with(|| a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .map(|(intent_type, confidence)| ClassifiedIntent {
                intent_type,
                confidence,
                entities: entities.clone(),
                original_text: text.to_string(),
            })
            .collect()
    }

    /// Highest-ranked intent.
    pub fn primary(&self, text: &str) -> ClassifiedIntent {
        let mut ranked = self.classify(text);
        // classify never returns an empty list
        ranked.swap_remove(0)
    }
}

fn score_intent(intent: IntentType, text: &str, tokens: &[String]) -> f64 {
    let pattern = if intent.patterns().iter().any(|re| re.is_match(text)) {
        PATTERN_CONFIDENCE
    } else {
        0.0
    };

    let keyword = if tokens.is_empty() {
        0.0
    } else {
        let vocabulary = intent.keywords();
        let hits = tokens
            .iter()
            .filter(|t| vocabulary.contains(&t.as_str()))
            .count();
        (hits as f64 / tokens.len() as f64 * KEYWORD_DENSITY_SCALE).min(KEYWORD_CAP)
    };

    pattern.max(keyword) * f64::from(intent.priority()) / 10.0
}
