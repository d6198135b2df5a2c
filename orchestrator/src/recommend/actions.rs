//! Suggested actions and the user-action history that biases them.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actions kept in the history.
pub const USER_ACTION_HISTORY: usize = 500;
/// Affinity per positive action (switch, accept, merge).
const POSITIVE_STEP: f64 = 0.025;
/// Affinity lost per dismissal.
const DISMISS_STEP: f64 = 0.05;
/// Bound on the affinity bonus and on the dismissal penalty.
const AFFINITY_CAP: f64 = 0.1;

/// What a recommendation suggests doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Switch to the context and keep going.
    Continue,
    /// Look at the context before deciding.
    Review,
    /// Resume a paused context.
    Resume,
    /// Archive an inactive context.
    Archive,
    /// Merge two overlapping contexts.
    Merge,
    /// Work on the context's pending or active tasks.
    AttendTasks,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Review => write!(f, "review"),
            Self::Resume => write!(f, "resume"),
            Self::Archive => write!(f, "archive"),
            Self::Merge => write!(f, "merge"),
            Self::AttendTasks => write!(f, "attend_tasks"),
        }
    }
}

/// What the user actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserActionKind {
    Switch,
    Accept,
    Dismiss,
    Merge,
    Archive,
}

impl UserActionKind {
    fn is_positive(self) -> bool {
        match self {
            Self::Switch | Self::Accept | Self::Merge => true,
            Self::Dismiss | Self::Archive => false,
        }
    }
}

/// One recorded user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub kind: UserActionKind,
    pub from_context: Option<String>,
    pub to_context: String,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// Bounded history of user actions.
#[derive(Debug, Clone)]
pub struct UserActionLog {
    actions: VecDeque<UserAction>,
    capacity: usize,
}

impl Default for UserActionLog {
    fn default() -> Self {
        Self::new(USER_ACTION_HISTORY)
    }
}

impl UserActionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            actions: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, action: UserAction) {
        self.actions.push_back(action);
        while self.actions.len() > self.capacity {
            self.actions.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &UserAction> {
        self.actions.iter().rev().take(n)
    }

    /// Learned bias toward `to` when coming from `from`, in −0.1..=0.1.
    ///
    /// Positive actions count whatever context they started from; a
    /// dismissal only counts when it was made from `from`.
    pub fn affinity(&self, from: Option<&str>, to: &str) -> f64 {
        let (positives, dismissals) = self
            .actions
            .iter()
            .filter(|a| a.to_context == to)
            .fold((0usize, 0usize), |(p, d), a| {
                if a.kind.is_positive() && (from.is_none() || a.from_context.as_deref() == from) {
                    (p + 1, d)
                } else if a.kind == UserActionKind::Dismiss && a.from_context.as_deref() == from {
                    (p, d + 1)
                } else {
                    (p, d)
                }
            });
        (positives as f64 * POSITIVE_STEP).min(AFFINITY_CAP)
            - (dismissals as f64 * DISMISS_STEP).min(AFFINITY_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: UserActionKind, from: Option<&str>, to: &str) -> UserAction {
        UserAction {
            kind,
            from_context: from.map(str::to_string),
            to_context: to.to_string(),
            message: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_affinity_caps() {
        let mut log = UserActionLog::default();
        for _ in 0..10 {
            log.record(action(UserActionKind::Switch, Some("a"), "b"));
        }
        assert!((log.affinity(Some("a"), "b") - 0.1).abs() < 1e-12);
        assert_eq!(log.affinity(Some("a"), "c"), 0.0);
    }

    #[test]
    fn test_dismissals_penalise() {
        let mut log = UserActionLog::default();
        log.record(action(UserActionKind::Accept, Some("a"), "b"));
        log.record(action(UserActionKind::Dismiss, Some("a"), "b"));
        assert!((log.affinity(Some("a"), "b") - (0.025 - 0.05)).abs() < 1e-12);
        // Dismissals from elsewhere do not count.
        assert!((log.affinity(Some("z"), "b")).abs() < 1e-12);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut log = UserActionLog::new(3);
        for i in 0..5 {
            log.record(action(UserActionKind::Switch, None, &format!("c{i}")));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.recent(1).next().unwrap().to_context, "c4");
    }
}
