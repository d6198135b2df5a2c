//! Per-model usage outcomes over a bounded window.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Rolling success/failure record per model.
#[derive(Debug, Clone)]
pub struct UsageHistory {
    window: usize,
    outcomes: HashMap<String, VecDeque<bool>>,
}

/// Aggregate view of one model's recent outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub model_id: String,
    pub samples: usize,
    pub successes: usize,
    pub success_rate: f64,
}

impl UsageHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            outcomes: HashMap::new(),
        }
    }

    /// Record one outcome, evicting the oldest past the window.
    pub fn record(&mut self, model_id: &str, success: bool) {
        let entry = self.outcomes.entry(model_id.to_string()).or_default();
        entry.push_back(success);
        while entry.len() > self.window {
            entry.pop_front();
        }
    }

    pub fn samples(&self, model_id: &str) -> usize {
        self.outcomes.get(model_id).map_or(0, VecDeque::len)
    }

    /// Success rate once at least `min_samples` outcomes exist.
    pub fn success_rate(&self, model_id: &str, min_samples: usize) -> Option<f64> {
        let outcomes = self.outcomes.get(model_id)?;
        if outcomes.is_empty() || outcomes.len() < min_samples {
            return None;
        }
        let successes = outcomes.iter().filter(|s| **s).count();
        Some(successes as f64 / outcomes.len() as f64)
    }

    pub fn stats(&self, model_id: &str) -> Option<UsageStats> {
        let outcomes = self.outcomes.get(model_id)?;
        let successes = outcomes.iter().filter(|s| **s).count();
        Some(UsageStats {
            model_id: model_id.to_string(),
            samples: outcomes.len(),
            successes,
            success_rate: if outcomes.is_empty() {
                0.0
            } else {
                successes as f64 / outcomes.len() as f64
            },
        })
    }
}

impl Default for UsageHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_requires_min_samples() {
        let mut history = UsageHistory::new(100);
        for _ in 0..9 {
            history.record("m", true);
        }
        assert_eq!(history.success_rate("m", 10), None);
        history.record("m", false);
        assert_eq!(history.success_rate("m", 10), Some(0.9));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut history = UsageHistory::new(3);
        history.record("m", false);
        history.record("m", true);
        history.record("m", true);
        history.record("m", true);
        assert_eq!(history.samples("m"), 3);
        assert_eq!(history.success_rate("m", 1), Some(1.0));
    }

    #[test]
    fn test_stats_unknown_model() {
        assert!(UsageHistory::default().stats("ghost").is_none());
    }
}
