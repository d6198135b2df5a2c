//! Thread recommender: suggests which context to continue, resume, archive
//! or merge.
//!
//! Relevance reuses the router's multi-factor scorer, biased by what the user
//! actually did with earlier suggestions. Message-driven results are cached
//! per message prefix and current context.

use std::collections::BTreeSet;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::actions::{ActionType, UserAction, UserActionKind, UserActionLog};
use super::cache::TtlCache;
use crate::clock::SharedClock;
use crate::context::{Context, ContextStatus, ContextType};
use crate::routing::{ContextScorer, MessageFeatures, RoutingWeights};
use crate::selection::{ModelSelector, SelectionPreferences};
use crate::text::{keyword_set, overlap_ratio, truncate};

/// Characters of the message used in the cache key.
const CACHE_KEY_PREFIX_CHARS: usize = 50;
/// Shared items listed in a merge reason.
const REASON_ITEMS: usize = 5;

const PRIORITY_ATTEND_TASKS: u8 = 8;
const PRIORITY_CONTINUE: u8 = 7;
const PRIORITY_RESUME: u8 = 5;
const PRIORITY_REVIEW: u8 = 5;
const PRIORITY_ARCHIVE: u8 = 2;

/// Recommendation thresholds and cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Score at or above which the action is `continue`.
    pub continue_threshold: f64,
    /// Score at or above which the action is `review`.
    pub review_threshold: f64,
    /// Similarity at or above which two contexts are merge candidates.
    pub merge_threshold: f64,
    pub cache_ttl_secs: i64,
    pub cache_capacity: usize,
    /// Open contexts idle longer than this are suggested for archiving.
    pub auto_archive_after_days: i64,
    /// Paused contexts younger than this are suggested for resuming.
    pub resume_window_hours: i64,
    /// User actions kept for affinity learning.
    pub action_history: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            continue_threshold: 0.7,
            review_threshold: 0.5,
            merge_threshold: 0.7,
            cache_ttl_secs: 300,
            cache_capacity: 256,
            auto_archive_after_days: 30,
            resume_window_hours: 24,
            action_history: super::actions::USER_ACTION_HISTORY,
        }
    }
}

impl RecommendationConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("continue_threshold", self.continue_threshold),
            ("review_threshold", self.review_threshold),
            ("merge_threshold", self.merge_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} ({value}) must be within 0.0-1.0"));
            }
        }
        if self.review_threshold > self.continue_threshold {
            return Err("review_threshold must not exceed continue_threshold".to_string());
        }
        if self.cache_ttl_secs < 0 {
            return Err("cache_ttl_secs must not be negative".to_string());
        }
        if self.auto_archive_after_days <= 0 {
            return Err("auto_archive_after_days must be at least 1".to_string());
        }
        if self.resume_window_hours < 0 {
            return Err("resume_window_hours must not be negative".to_string());
        }
        Ok(())
    }
}

/// One suggested action on a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecommendation {
    pub context_id: String,
    pub action: ActionType,
    /// 1 (low) – 10 (high)
    pub priority: u8,
    /// Relevance, 0.0–1.0. Zero for proactive suggestions.
    pub score: f64,
    pub reason: String,
    /// Model the selector would pick for the message in this context.
    pub suggested_model: Option<String>,
}

/// Two contexts similar enough to merge. `source` is the less recently
/// active one and would be folded into `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub source_id: String,
    pub target_id: String,
    pub context_type: ContextType,
    /// 0.0–1.0
    pub similarity: f64,
    pub reason: String,
}

/// Filters for proactive recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProactivePreferences {
    pub limit: usize,
    pub include_tasks: bool,
    pub include_resume: bool,
    pub include_archive: bool,
}

impl Default for ProactivePreferences {
    fn default() -> Self {
        Self {
            limit: 10,
            include_tasks: true,
            include_resume: true,
            include_archive: true,
        }
    }
}

/// Recommends contexts for a message and maintenance actions for the set.
pub struct ThreadRecommender {
    scorer: ContextScorer,
    cache: TtlCache<(String, Option<String>), Vec<ThreadRecommendation>>,
    actions: UserActionLog,
    config: RecommendationConfig,
    clock: SharedClock,
}

impl ThreadRecommender {
    pub fn new(config: RecommendationConfig, weights: RoutingWeights, clock: SharedClock) -> Self {
        Self {
            scorer: ContextScorer::new(weights, clock.clone()),
            cache: TtlCache::new(
                Duration::seconds(config.cache_ttl_secs),
                config.cache_capacity,
                clock.clone(),
            ),
            actions: UserActionLog::new(config.action_history),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    pub fn actions(&self) -> &UserActionLog {
        &self.actions
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Contexts relevant to `message`, best first, excluding `current`.
    ///
    /// Contexts scoring below the review threshold are left out unless they
    /// carry pending or active tasks.
    pub fn get_recommendations(
        &mut self,
        message: &str,
        contexts: &[Context],
        current: Option<&str>,
        limit: usize,
        selector: Option<&ModelSelector>,
    ) -> Vec<ThreadRecommendation> {
        let key = (
            truncate(message, CACHE_KEY_PREFIX_CHARS).to_lowercase(),
            current.map(str::to_string),
        );
        if let Some(cached) = self.cache.get(&key) {
            debug!(cached = cached.len(), "Recommendation cache hit");
            // Contexts closed since the entry was cached are dropped.
            return cached
                .into_iter()
                .filter(|r| {
                    contexts
                        .iter()
                        .any(|c| c.id == r.context_id && c.status.is_open())
                })
                .take(limit)
                .collect();
        }

        let features = MessageFeatures::from_text(message);
        let mut ranked: Vec<ThreadRecommendation> = contexts
            .iter()
            .filter(|c| c.status.is_open() && Some(c.id.as_str()) != current)
            .filter_map(|c| self.recommend_for(message, &features, c, current, selector))
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.context_id.cmp(&b.context_id))
        });

        debug!(
            candidates = ranked.len(),
            top = ranked.first().map(|r| r.score).unwrap_or(0.0),
            "Recommendations computed"
        );
        self.cache.insert(key, ranked.clone());
        ranked.truncate(limit);
        ranked
    }

    fn recommend_for(
        &self,
        message: &str,
        features: &MessageFeatures,
        context: &Context,
        current: Option<&str>,
        selector: Option<&ModelSelector>,
    ) -> Option<ThreadRecommendation> {
        let base = self.scorer.score(features, context).score;
        let affinity = self.actions.affinity(current, &context.id);
        let score = (base + affinity).clamp(0.0, 1.0);
        let has_tasks = context.tasks.has_any();

        let (action, priority, reason) = if score >= self.config.continue_threshold {
            (
                ActionType::Continue,
                PRIORITY_CONTINUE,
                format!("strong match ({score:.2}) with {}", describe(context)),
            )
        } else if has_tasks {
            (
                ActionType::Review,
                PRIORITY_ATTEND_TASKS,
                format!(
                    "{} open task(s) in {} (relevance {score:.2})",
                    context.tasks.len(),
                    describe(context)
                ),
            )
        } else if score >= self.config.review_threshold {
            (
                ActionType::Review,
                PRIORITY_REVIEW,
                format!("possible match ({score:.2}) with {}", describe(context)),
            )
        } else {
            return None;
        };

        let suggested_model = selector
            .and_then(|s| s.select(message, Some(context), &SelectionPreferences::default()))
            .map(|r| r.model.model_id);

        Some(ThreadRecommendation {
            context_id: context.id.clone(),
            action,
            priority,
            score,
            reason,
            suggested_model,
        })
    }

    /// Maintenance suggestions that need no message: contexts with open tasks,
    /// recently paused contexts worth resuming, and stale ones to archive.
    pub fn get_proactive_recommendations(
        &self,
        contexts: &[Context],
        current: Option<&str>,
        preferences: &ProactivePreferences,
    ) -> Vec<ThreadRecommendation> {
        let now = self.clock.now();
        let resume_window = Duration::hours(self.config.resume_window_hours);
        let archive_after = Duration::days(self.config.auto_archive_after_days);

        let mut out: Vec<(ThreadRecommendation, &Context)> = Vec::new();
        for context in contexts
            .iter()
            .filter(|c| c.status.is_open() && Some(c.id.as_str()) != current)
        {
            let idle = now - context.last_active_at;
            let suggestion = if preferences.include_tasks && context.tasks.has_any() {
                Some((
                    ActionType::AttendTasks,
                    PRIORITY_ATTEND_TASKS,
                    format!(
                        "{} pending, {} active task(s) in {}",
                        context.tasks.pending.len(),
                        context.tasks.active.len(),
                        describe(context)
                    ),
                ))
            } else if preferences.include_resume
                && context.status == ContextStatus::Paused
                && idle < resume_window
            {
                Some((
                    ActionType::Resume,
                    PRIORITY_RESUME,
                    format!("{} was paused {}h ago", describe(context), idle.num_hours()),
                ))
            } else if preferences.include_archive && idle > archive_after {
                Some((
                    ActionType::Archive,
                    PRIORITY_ARCHIVE,
                    format!("{} inactive for {} days", describe(context), idle.num_days()),
                ))
            } else {
                None
            };

            if let Some((action, priority, reason)) = suggestion {
                out.push((
                    ThreadRecommendation {
                        context_id: context.id.clone(),
                        action,
                        priority,
                        score: 0.0,
                        reason,
                        suggested_model: None,
                    },
                    context,
                ));
            }
        }

        out.sort_by(|(a, ca), (b, cb)| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| cb.last_active_at.cmp(&ca.last_active_at))
                .then_with(|| a.context_id.cmp(&b.context_id))
        });
        out.into_iter()
            .take(preferences.limit)
            .map(|(r, _)| r)
            .collect()
    }

    /// Same-type, non-archived pairs whose goal, topic and entity overlap
    /// averages at least the merge threshold. Most similar first.
    pub fn find_merge_candidates(&self, contexts: &[Context]) -> Vec<MergeCandidate> {
        let open: Vec<&Context> = contexts.iter().filter(|c| c.status.is_open()).collect();
        let mut candidates = Vec::new();

        for (i, a) in open.iter().enumerate() {
            for b in &open[i + 1..] {
                if a.context_type != b.context_type {
                    continue;
                }
                let Some(similarity) = merge_similarity(a, b) else {
                    continue;
                };
                if similarity < self.config.merge_threshold {
                    continue;
                }
                let (source, target) = if (a.last_active_at, &a.id) < (b.last_active_at, &b.id) {
                    (*a, *b)
                } else {
                    (*b, *a)
                };
                candidates.push(MergeCandidate {
                    source_id: source.id.clone(),
                    target_id: target.id.clone(),
                    context_type: a.context_type,
                    similarity,
                    reason: merge_reason(a, b, similarity),
                });
            }
        }

        candidates.sort_by(|x, y| {
            y.similarity
                .total_cmp(&x.similarity)
                .then_with(|| x.source_id.cmp(&y.source_id))
                .then_with(|| x.target_id.cmp(&y.target_id))
        });
        if !candidates.is_empty() {
            info!(count = candidates.len(), "Merge candidates found");
        }
        candidates
    }

    /// Record what the user did. Clears cached recommendations.
    pub fn record_user_action(
        &mut self,
        kind: UserActionKind,
        from: Option<&str>,
        to: &str,
        message: Option<&str>,
    ) {
        self.actions.record(UserAction {
            kind,
            from_context: from.map(str::to_string),
            to_context: to.to_string(),
            message: message.map(str::to_string),
            at: self.clock.now(),
        });
        self.cache.clear();
        debug!(?kind, from = ?from, to, "User action recorded");
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

fn describe(context: &Context) -> String {
    match &context.goal {
        Some(goal) => format!("{} context \"{}\"", context.context_type, goal),
        None => format!("{} context {}", context.context_type, context.id),
    }
}

/// Average overlap over the factors both contexts have. `None` when they
/// share no comparable factor.
fn merge_similarity(a: &Context, b: &Context) -> Option<f64> {
    let mut factors = Vec::with_capacity(3);

    if let (Some(ga), Some(gb)) = (&a.goal, &b.goal) {
        let (ka, kb) = (keyword_set(ga), keyword_set(gb));
        if !ka.is_empty() && !kb.is_empty() {
            factors.push(overlap_ratio(&ka, &kb));
        }
    }
    if !a.summary.topics.is_empty() && !b.summary.topics.is_empty() {
        factors.push(overlap_ratio(&a.summary.topics, &b.summary.topics));
    }
    let (ea, eb) = (a.summary.entity_set(), b.summary.entity_set());
    if !ea.is_empty() && !eb.is_empty() {
        factors.push(overlap_ratio(&ea, &eb));
    }

    if factors.is_empty() {
        return None;
    }
    Some(factors.iter().sum::<f64>() / factors.len() as f64)
}

fn merge_reason(a: &Context, b: &Context, similarity: f64) -> String {
    fn listed(shared: &BTreeSet<String>) -> String {
        shared
            .iter()
            .take(REASON_ITEMS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    let topics: BTreeSet<String> = a
        .summary
        .topics
        .intersection(&b.summary.topics)
        .cloned()
        .collect();
    let entities: BTreeSet<String> = a
        .summary
        .entity_set()
        .intersection(&b.summary.entity_set())
        .cloned()
        .collect();

    let mut parts = vec![format!("both are {} contexts", a.context_type)];
    if !topics.is_empty() {
        parts.push(format!("{} shared topic(s): {}", topics.len(), listed(&topics)));
    }
    if !entities.is_empty() {
        parts.push(format!(
            "{} shared entit{}: {}",
            entities.len(),
            if entities.len() == 1 { "y" } else { "ies" },
            listed(&entities)
        ));
    }
    format!("{}; similarity {:.2}", parts.join("; "), similarity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::context::{ContextMessage, MessageRole, TaskRefs};
    use crate::registry::ModelRegistry;
    use crate::text::{EntityKind, ExtractedEntity};
    use std::sync::Arc;

    fn recommender() -> (ThreadRecommender, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (
            ThreadRecommender::new(
                RecommendationConfig::default(),
                RoutingWeights::default(),
                clock.clone(),
            ),
            clock,
        )
    }

    fn context(id: &str, goal: &str, messages: &[&str], clock: &ManualClock) -> Context {
        let mut ctx = Context::with_id(id, ContextType::Primary, Some(goal.into()), clock.now());
        for m in messages {
            ctx.push_message(ContextMessage::new(MessageRole::User, m, 5, clock.now()));
        }
        ctx.recompute_summary(&[]);
        ctx
    }

    fn with_summary(id: &str, topics: &[&str], entities: &[&str], clock: &ManualClock) -> Context {
        let mut ctx = Context::with_id(id, ContextType::Task, None, clock.now());
        ctx.summary.topics = topics.iter().map(|t| t.to_string()).collect();
        ctx.summary.entities = entities
            .iter()
            .map(|e| ExtractedEntity::new(EntityKind::ProperNoun, e))
            .collect();
        ctx
    }

    #[test]
    fn test_strong_match_is_continue() {
        let (mut rec, clock) = recommender();
        let kanban = context(
            "kanban",
            "kanban board planning",
            &["move cards on the kanban board", "kanban planning for sprint"],
            &clock,
        );
        let other = context("garden", "vegetable garden", &["tomatoes need water"], &clock);

        let recs = rec.get_recommendations(
            "move kanban board planning cards",
            &[kanban, other],
            None,
            5,
            None,
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].context_id, "kanban");
        assert_eq!(recs[0].action, ActionType::Continue);
        assert_eq!(recs[0].priority, 7);
    }

    #[test]
    fn test_current_context_excluded_and_tasks_reviewed() {
        let (mut rec, clock) = recommender();
        let current = context("cur", "kanban board planning", &["kanban board"], &clock);
        let mut tasks = context("tasks", "quarterly taxes", &["receipts"], &clock);
        tasks.tasks = TaskRefs {
            pending: vec!["t1".into()],
            active: vec![],
        };

        let recs = rec.get_recommendations("kanban board", &[current, tasks], Some("cur"), 5, None);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].context_id, "tasks");
        assert_eq!(recs[0].action, ActionType::Review);
        assert_eq!(recs[0].priority, 8);
    }

    #[test]
    fn test_suggested_model_comes_from_selector() {
        let (mut rec, clock) = recommender();
        let ctx = context("k", "kanban board planning", &["kanban board cards"], &clock);
        let selector = ModelSelector::new(ModelRegistry::with_defaults());
        let recs = rec.get_recommendations("kanban board planning", &[ctx], None, 5, Some(&selector));
        assert!(recs[0].suggested_model.is_some());
    }

    #[test]
    fn test_cache_and_invalidation() {
        let (mut rec, clock) = recommender();
        let ctx = context("k", "kanban board planning", &["kanban board cards"], &clock);
        let contexts = vec![ctx];

        let drifted = vec![context("k", "vegetable garden", &["tomatoes need water"], &clock)];

        rec.get_recommendations("kanban board planning", &contexts, None, 5, None);
        assert_eq!(rec.cached_entries(), 1);
        // Cached ranking is reused while the context stays open.
        let cached = rec.get_recommendations("kanban board planning", &drifted, None, 5, None);
        assert_eq!(cached.len(), 1);

        rec.record_user_action(UserActionKind::Accept, None, "k", None);
        assert_eq!(rec.cached_entries(), 0);
        assert!(rec
            .get_recommendations("kanban board planning", &drifted, None, 5, None)
            .is_empty());

        // Entries expire after the TTL.
        clock.advance(Duration::minutes(5));
        assert_eq!(
            rec.get_recommendations("kanban board planning", &contexts, None, 5, None)
                .len(),
            1
        );
        clock.advance(Duration::minutes(5));
        assert!(rec
            .get_recommendations("kanban board planning", &drifted, None, 5, None)
            .is_empty());
    }

    #[test]
    fn test_cached_recommendations_skip_closed_contexts() {
        let (mut rec, clock) = recommender();
        let kanban = context("k", "kanban board planning", &["kanban board cards"], &clock);
        let recs = rec.get_recommendations("kanban board planning", &[kanban.clone()], None, 5, None);
        assert_eq!(recs.len(), 1);

        for status in [ContextStatus::Archived, ContextStatus::Failed] {
            let mut closed = kanban.clone();
            closed.status = status;
            assert!(
                rec.get_recommendations("kanban board planning", &[closed], None, 5, None)
                    .is_empty(),
                "{status:?}"
            );
        }
        // Cache entry survives; the open context is recommended again.
        assert_eq!(rec.cached_entries(), 1);
        assert_eq!(
            rec.get_recommendations("kanban board planning", &[kanban], None, 5, None)
                .len(),
            1
        );
    }

    #[test]
    fn test_affinity_lifts_borderline_context() {
        let (mut rec, clock) = recommender();
        let ctx = context("k", "kanban board planning", &[], &clock);
        let baseline = rec.get_recommendations("kanban board", &[ctx.clone()], Some("cur"), 5, None);
        let base_score = baseline[0].score;

        for _ in 0..4 {
            rec.record_user_action(UserActionKind::Switch, Some("cur"), "k", Some("kanban"));
        }
        let boosted = rec.get_recommendations("kanban board", &[ctx], Some("cur"), 5, None);
        assert!((boosted[0].score - base_score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_proactive_recommendations() {
        let (rec, clock) = recommender();
        let stale = Context::with_id("stale", ContextType::Primary, None, clock.now());
        clock.advance(Duration::days(40));

        let mut tasks = Context::with_id("tasks", ContextType::Task, None, clock.now());
        tasks.tasks = TaskRefs {
            pending: vec![],
            active: vec!["t9".into()],
        };
        let mut paused = Context::with_id("paused", ContextType::Primary, None, clock.now());
        paused.status = ContextStatus::Paused;
        let mut archived = Context::with_id("old", ContextType::Primary, None, clock.now());
        archived.status = ContextStatus::Archived;
        clock.advance(Duration::hours(2));

        let recs = rec.get_proactive_recommendations(
            &[stale, tasks, paused, archived],
            None,
            &ProactivePreferences::default(),
        );
        let summary: Vec<(&str, ActionType, u8)> = recs
            .iter()
            .map(|r| (r.context_id.as_str(), r.action, r.priority))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("tasks", ActionType::AttendTasks, 8),
                ("paused", ActionType::Resume, 5),
                ("stale", ActionType::Archive, 2),
            ]
        );
    }

    #[test]
    fn test_merge_candidates_from_shared_topics_and_entities() {
        let (rec, clock) = recommender();
        let a = with_summary(
            "a",
            &["kanban", "sprint", "backlog", "board", "velocity"],
            &["alice", "bob", "jira", "acme"],
            &clock,
        );
        clock.advance(Duration::minutes(1));
        let b = with_summary(
            "b",
            &["kanban", "sprint", "backlog", "board", "retro"],
            &["alice", "bob", "jira", "globex"],
            &clock,
        );
        let mut other_type = with_summary("c", &["kanban"], &["alice"], &clock);
        other_type.context_type = ContextType::Primary;

        let found = rec.find_merge_candidates(&[a, b, other_type]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_id, "a");
        assert_eq!(found[0].target_id, "b");
        assert!((found[0].similarity - 0.775).abs() < 1e-9);
        assert!(found[0].reason.contains("4 shared topic(s)"));
        assert!(found[0].reason.contains("3 shared entities"));
    }

    #[test]
    fn test_archived_contexts_never_merge() {
        let (rec, clock) = recommender();
        let a = with_summary("a", &["kanban"], &["alice"], &clock);
        let mut b = with_summary("b", &["kanban"], &["alice"], &clock);
        b.status = ContextStatus::Archived;
        assert!(rec.find_merge_candidates(&[a, b]).is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RecommendationConfig::default();
        assert!(config.validate().is_ok());
        config.review_threshold = 0.9;
        assert!(config.validate().is_err());
    }
}
