//! Orchestrator facade: the per-message control flow and every caller-facing
//! operation.
//!
//! ```text
//! message ─▶ route ─▶ create-or-append ─▶ compaction check ─▶ select model
//!                                                               │
//!        persist ◀─ append reply ◀─ generate ◀─ build prompt ◀──┘
//! ```
//!
//! Compaction runs on a background worker; callers learn about it through
//! [`Orchestrator::subscribe`]. A failed generation does not reject the
//! message: the outcome carries the error and the user message stays stored.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn, Instrument};

use crate::analysis::ComplexityAnalyzer;
use crate::clock::SharedClock;
use crate::collaborators::{GenerationService, PersistenceStore, TaskSource};
use crate::config::OrchestratorConfig;
use crate::context::{
    Context, ContextMessage, ContextStatus, ContextStore, ContextType, MessageRole,
};
use crate::error::{ConfigError, OrchestratorResult, StoreError};
use crate::events::{EventBus, OrchestratorEvent, SharedEventBus};
use crate::memory::{
    CompactionHandle, CompactionOutcome, CompactionWorker, ContextCompactor, ContextStatusReport,
    MemorySnapshot, WorkerStatsSnapshot,
};
use crate::recommend::{
    MergeCandidate, ProactivePreferences, ThreadRecommendation, ThreadRecommender,
    UserActionKind,
};
use crate::routing::{ContextRouter, RoutingDecision, RoutingPreferences, RoutingRule};
use crate::selection::{ModelRecommendation, ModelSelector, SelectionPreferences};
use crate::telemetry::{self, PipelineCounters, PipelineSummary};

/// Per-message caller preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagePreferences {
    pub routing: RoutingPreferences,
    pub selection: SelectionPreferences,
    /// Goal given to a context created for this message.
    pub new_context_goal: Option<String>,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOutcome {
    /// Context the message was stored in.
    pub context_id: String,
    pub created_context: bool,
    pub routing: RoutingDecision,
    pub model: Option<ModelRecommendation>,
    pub reply: Option<String>,
    /// Set when generation failed; the user message is still stored.
    pub generation_error: Option<String>,
    /// A background compaction was queued for the context.
    pub compaction_requested: bool,
}

/// Result of [`Orchestrator::run_maintenance`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub paused: Vec<String>,
    pub archived: Vec<String>,
    pub tasks_refreshed: usize,
    pub task_errors: usize,
}

/// Owns the store, the analyzers, the worker, and the collaborators.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<ContextStore>,
    router: ContextRouter,
    selector: RwLock<ModelSelector>,
    recommender: Mutex<ThreadRecommender>,
    compaction: CompactionHandle,
    generator: Arc<dyn GenerationService>,
    persistence: Arc<dyn PersistenceStore>,
    tasks: Option<Arc<dyn TaskSource>>,
    events: SharedEventBus,
    clock: SharedClock,
    counters: PipelineCounters,
}

impl Orchestrator {
    /// Validate the config and start the compaction worker. Must be called
    /// inside a Tokio runtime.
    pub fn new(
        config: OrchestratorConfig,
        generator: Arc<dyn GenerationService>,
        persistence: Arc<dyn PersistenceStore>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let store = Arc::new(ContextStore::new(clock.clone(), config.max_context_tokens));
        let events = EventBus::new().shared();
        let router =
            ContextRouter::with_hints(config.routing.clone(), clock.clone(), config.build_hints()?);
        let selector = ModelSelector::with_weights(
            config.build_registry()?,
            ComplexityAnalyzer::with_weights(config.complexity.clone()),
            config.selection.clone(),
        );
        let recommender = ThreadRecommender::new(
            config.recommendation.clone(),
            config.routing.clone(),
            clock.clone(),
        );
        let compactor = ContextCompactor::new(
            config.compaction.clone(),
            store.clone(),
            generator.clone(),
            persistence.clone(),
            clock.clone(),
        )
        .with_events(events.clone());

        info!(
            max_context_tokens = config.max_context_tokens,
            models = selector.registry().len(),
            hints = router.hints().len(),
            "Orchestrator started"
        );

        Ok(Self {
            compaction: CompactionWorker::spawn(compactor),
            selector: RwLock::new(selector),
            recommender: Mutex::new(recommender),
            router,
            store,
            generator,
            persistence,
            tasks: None,
            events,
            clock,
            counters: PipelineCounters::new(),
            config,
        })
    }

    /// Attach a task source used by maintenance.
    pub fn with_task_source(mut self, tasks: Arc<dyn TaskSource>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// All orchestration events, compaction outcomes included.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub fn pipeline_summary(&self) -> PipelineSummary {
        self.counters.summary()
    }

    pub fn compaction_stats(&self) -> WorkerStatsSnapshot {
        self.compaction.stats()
    }

    /// Handle one inbound message end to end.
    pub async fn handle_message(
        &self,
        text: &str,
        current: Option<&str>,
        preferences: &MessagePreferences,
    ) -> OrchestratorResult<MessageOutcome> {
        let span = telemetry::message_span(current, text.chars().count());
        let started = Instant::now();
        let result = self
            .process_message(text, current, preferences)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => telemetry::record_message_result(
                &span,
                &outcome.context_id,
                outcome.generation_error.is_none(),
                elapsed,
            ),
            Err(_) => telemetry::record_message_result(&span, "", false, elapsed),
        }
        result
    }

    async fn process_message(
        &self,
        text: &str,
        current: Option<&str>,
        preferences: &MessagePreferences,
    ) -> OrchestratorResult<MessageOutcome> {
        let routing = self.route(text, current, &preferences.routing).await;
        self.counters.record_route(&routing);

        let (context_id, created_context) = self
            .store_user_message(text, &routing, preferences.new_context_goal.clone())
            .await?;
        self.events.publish(OrchestratorEvent::MessageRouted {
            context_id: context_id.clone(),
            confidence: routing.confidence,
            new_context: created_context,
            timestamp: self.clock.now(),
        });

        if routing.rule == RoutingRule::ExplicitSwitch {
            if let Some(from) = current.filter(|c| *c != context_id) {
                self.recommender.lock().await.record_user_action(
                    UserActionKind::Switch,
                    Some(from),
                    &context_id,
                    Some(text),
                );
            }
        }

        let compaction_requested = self.request_compaction_if_needed(&context_id).await;

        let context = self.store.get(&context_id).await?;
        let model = self
            .select_for_context(text, &context, &preferences.selection)
            .await;

        let mut reply = None;
        let mut generation_error = None;
        if let Some(recommendation) = &model {
            match self.generate_reply(&context, recommendation).await {
                Ok(text) => reply = Some(text),
                Err(e) => generation_error = Some(e.to_string()),
            }
        }

        self.persist(&context_id).await;

        Ok(MessageOutcome {
            context_id,
            created_context,
            routing,
            model,
            reply,
            generation_error,
            compaction_requested,
        })
    }

    /// Append the user message to the routed context, or to a new one.
    async fn store_user_message(
        &self,
        text: &str,
        routing: &RoutingDecision,
        goal: Option<String>,
    ) -> OrchestratorResult<(String, bool)> {
        if let Some(target) = routing.target_context_id.as_deref() {
            match self.store.append_message(target, MessageRole::User, text).await {
                Ok(_) => return Ok((target.to_string(), false)),
                // Closed or removed since routing; fall through to a new context.
                Err(e @ (StoreError::Closed { .. } | StoreError::NotFound(_))) => {
                    warn!(context_id = %target, error = %e, "Routed context unavailable, creating a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let context_type = routing
            .suggested_context_type
            .unwrap_or(ContextType::Primary);
        let context = self.create_context(context_type, goal).await;
        self.store
            .append_message(&context.id, MessageRole::User, text)
            .await?;
        Ok((context.id, true))
    }

    async fn request_compaction_if_needed(&self, context_id: &str) -> bool {
        match self.compaction.compactor().evaluate(context_id).await {
            Ok(decision) if decision.should_compact() => {
                let queued = self.compaction.request(context_id);
                debug!(context_id, decision = %decision, queued, "Compaction requested");
                queued
            }
            Ok(_) => false,
            Err(e) => {
                debug!(context_id, kind = %e.kind, "Compaction check failed");
                false
            }
        }
    }

    async fn select_for_context(
        &self,
        text: &str,
        context: &Context,
        preferences: &SelectionPreferences,
    ) -> Option<ModelRecommendation> {
        let span = telemetry::selection_span(&context.id);
        let recommendation = self
            .selector
            .read()
            .await
            .select(text, Some(context), preferences)?;
        telemetry::record_selection(&span, &recommendation);
        self.counters.record_selection(&recommendation);
        self.events.publish(OrchestratorEvent::ModelSelected {
            context_id: Some(context.id.clone()),
            model_id: recommendation.model.model_id.clone(),
            complexity: recommendation.complexity.level,
            score: recommendation.score,
            fallback: recommendation.fallback,
            timestamp: self.clock.now(),
        });
        Some(recommendation)
    }

    async fn generate_reply(
        &self,
        context: &Context,
        recommendation: &ModelRecommendation,
    ) -> OrchestratorResult<String> {
        let model_id = recommendation.model.model_id.as_str();
        let snapshots = self.store.snapshots(&context.id).await?;
        let prompt = build_prompt(context, &snapshots, self.config.prompt_recent_messages);

        let span = telemetry::generation_span(model_id, &context.id);
        let started = Instant::now();
        let result = self
            .generator
            .generate(&prompt, &recommendation.config)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed().as_millis() as u64;

        match result {
            Ok(reply) => {
                let message = self
                    .store
                    .append_message(&context.id, MessageRole::Assistant, &reply)
                    .await?;
                self.selector.write().await.record_usage(model_id, true);
                self.counters.record_generation(true, message.tokens);
                telemetry::record_generation_result(&span, true, elapsed, message.tokens);
                Ok(reply)
            }
            Err(e) => {
                self.selector.write().await.record_usage(model_id, false);
                self.counters.record_generation(false, 0);
                telemetry::record_generation_result(&span, false, elapsed, 0);
                warn!(context_id = %context.id, model_id, error = %e, "Generation failed");
                Err(e.into())
            }
        }
    }

    // ── Exposed operations ──────────────────────────────────────────

    /// Route a message without storing it.
    pub async fn route(
        &self,
        text: &str,
        current: Option<&str>,
        preferences: &RoutingPreferences,
    ) -> RoutingDecision {
        let contexts = self.store.snapshot_all().await;
        let span = telemetry::route_span(contexts.iter().filter(|c| c.status.is_open()).count());
        let decision = span.in_scope(|| self.router.route(text, &contexts, current, preferences));
        telemetry::record_route(&span, &decision);
        decision
    }

    /// Recommend a model for a message, optionally within a context.
    pub async fn select_model(
        &self,
        text: &str,
        context_id: Option<&str>,
        preferences: &SelectionPreferences,
    ) -> OrchestratorResult<Option<ModelRecommendation>> {
        let context = match context_id {
            Some(id) => Some(self.store.get(id).await?),
            None => None,
        };
        Ok(self
            .selector
            .read()
            .await
            .select(text, context.as_ref(), preferences))
    }

    pub async fn get_context_status(&self, context_id: &str) -> OrchestratorResult<ContextStatusReport> {
        Ok(self.store.status_report(context_id).await?)
    }

    pub async fn get_recommendations(
        &self,
        text: &str,
        current: Option<&str>,
        limit: usize,
    ) -> Vec<ThreadRecommendation> {
        let contexts = self.store.snapshot_all().await;
        let mut recommender = self.recommender.lock().await;
        let selector = self.selector.read().await;
        recommender.get_recommendations(text, &contexts, current, limit, Some(&selector))
    }

    pub async fn get_proactive_recommendations(
        &self,
        current: Option<&str>,
        preferences: &ProactivePreferences,
    ) -> Vec<ThreadRecommendation> {
        let contexts = self.store.snapshot_all().await;
        self.recommender
            .lock()
            .await
            .get_proactive_recommendations(&contexts, current, preferences)
    }

    pub async fn find_merge_candidates(&self) -> Vec<MergeCandidate> {
        let contexts = self.store.snapshot_all().await;
        self.recommender.lock().await.find_merge_candidates(&contexts)
    }

    /// Feed a model call outcome back into selection.
    pub async fn record_usage(&self, model_id: &str, success: bool) {
        self.selector.write().await.record_usage(model_id, success);
    }

    pub async fn record_user_action(
        &self,
        kind: UserActionKind,
        from: Option<&str>,
        to: &str,
        message: Option<&str>,
    ) {
        self.recommender
            .lock()
            .await
            .record_user_action(kind, from, to, message);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub async fn create_context(&self, context_type: ContextType, goal: Option<String>) -> Context {
        let context = self.store.create(context_type, goal).await;
        self.events.publish(OrchestratorEvent::ContextCreated {
            context_id: context.id.clone(),
            context_type,
            timestamp: self.clock.now(),
        });
        self.persist(&context.id).await;
        context
    }

    /// Append without routing or generation.
    pub async fn append_message(
        &self,
        context_id: &str,
        role: MessageRole,
        content: &str,
    ) -> OrchestratorResult<ContextMessage> {
        let message = self.store.append_message(context_id, role, content).await?;
        self.request_compaction_if_needed(context_id).await;
        Ok(message)
    }

    pub async fn pause(&self, context_id: &str) -> OrchestratorResult<Context> {
        self.transition(context_id, ContextStatus::Paused).await
    }

    pub async fn resume(&self, context_id: &str) -> OrchestratorResult<Context> {
        self.transition(context_id, ContextStatus::Active).await
    }

    pub async fn archive(&self, context_id: &str) -> OrchestratorResult<Context> {
        self.transition(context_id, ContextStatus::Archived).await
    }

    pub async fn fail(&self, context_id: &str) -> OrchestratorResult<Context> {
        self.transition(context_id, ContextStatus::Failed).await
    }

    async fn transition(&self, context_id: &str, to: ContextStatus) -> OrchestratorResult<Context> {
        let from = self.store.get(context_id).await?.status;
        let context = match to {
            ContextStatus::Active => self.store.resume(context_id).await?,
            other => self.store.transition(context_id, other).await?,
        };
        self.publish_status(context_id, from, to);
        self.recommender.lock().await.clear_cache();
        self.persist(context_id).await;
        Ok(context)
    }

    /// Merge `source` into `target`; the source is archived.
    pub async fn merge(&self, source_id: &str, target_id: &str) -> OrchestratorResult<Context> {
        let merged = self.store.merge(source_id, target_id).await?;
        self.events.publish(OrchestratorEvent::ContextsMerged {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            timestamp: self.clock.now(),
        });
        self.recommender.lock().await.record_user_action(
            UserActionKind::Merge,
            Some(source_id),
            target_id,
            None,
        );
        self.persist(source_id).await;
        self.persist(target_id).await;
        Ok(merged)
    }

    /// Compact immediately, bypassing the utilization trigger.
    pub async fn compact_now(&self, context_id: &str) -> OrchestratorResult<CompactionOutcome> {
        Ok(self.compaction.compactor().compact_now(context_id).await?)
    }

    /// Load a persisted context and its snapshots into the store. Returns the
    /// in-store copy when the context is already loaded.
    ///
    /// The rollup is recomputed from the loaded history; a persisted
    /// `ContextState` that disagrees with it is logged and overwritten.
    pub async fn load_context(&self, context_id: &str) -> OrchestratorResult<Option<Context>> {
        if self.store.contains(context_id).await {
            return Ok(Some(self.store.get(context_id).await?));
        }
        let Some(context) = self.persistence.load_context(context_id).await? else {
            return Ok(None);
        };
        let snapshots = self.persistence.load_snapshots(context_id).await?;
        let persisted_state = self.persistence.load_context_state(context_id).await?;
        let snapshot_count = snapshots.len();
        self.store.insert_with_snapshots(context, snapshots).await?;

        let state = self.store.context_state(context_id).await?;
        if persisted_state.as_ref() != Some(&state) {
            if let Some(stale) = &persisted_state {
                warn!(
                    context_id,
                    persisted_snapshots = stale.snapshot_count,
                    loaded_snapshots = state.snapshot_count,
                    persisted_tokens = stale.total_tokens,
                    loaded_tokens = state.total_tokens,
                    "Persisted context state disagrees with loaded history"
                );
            }
            if let Err(e) = self.persistence.save_context_state(&state).await {
                warn!(context_id, error = %e, "Failed to persist context state");
            }
        }
        info!(context_id, snapshot_count, "Context loaded from persistence");
        Ok(Some(self.store.get(context_id).await?))
    }

    /// Pause idle contexts, archive stale ones, and refresh task references.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        if let Some(hours) = self.config.auto_pause_idle_hours {
            report.paused = self
                .store
                .auto_pause_idle(chrono::Duration::hours(hours))
                .await;
            for id in &report.paused {
                self.publish_status(id, ContextStatus::Active, ContextStatus::Paused);
                self.persist(id).await;
            }
        }

        let contexts = self.store.snapshot_all().await;
        report.archived = self
            .store
            .archive_stale(self.config.recommendation.auto_archive_after_days)
            .await;
        for id in &report.archived {
            let from = contexts
                .iter()
                .find(|c| &c.id == id)
                .map_or(ContextStatus::Active, |c| c.status);
            self.publish_status(id, from, ContextStatus::Archived);
            self.persist(id).await;
        }

        if !report.paused.is_empty() || !report.archived.is_empty() {
            self.recommender.lock().await.clear_cache();
        }

        if let Some(tasks) = &self.tasks {
            for context in self.store.snapshot_all().await {
                if !context.status.is_open() {
                    continue;
                }
                match tasks.tasks_for(&context.id).await {
                    Ok(refs) => {
                        if refs != context.tasks && self.store.update_tasks(&context.id, refs).await.is_ok() {
                            report.tasks_refreshed += 1;
                        }
                    }
                    Err(e) => {
                        report.task_errors += 1;
                        warn!(context_id = %context.id, error = %e, "Task refresh failed");
                    }
                }
            }
        }

        info!(
            paused = report.paused.len(),
            archived = report.archived.len(),
            tasks_refreshed = report.tasks_refreshed,
            task_errors = report.task_errors,
            "Maintenance finished"
        );
        report
    }

    /// Stop the compaction worker after draining queued requests.
    pub async fn shutdown(self) {
        self.compaction.shutdown().await;
        info!("Orchestrator stopped");
    }

    fn publish_status(&self, context_id: &str, from: ContextStatus, to: ContextStatus) {
        self.events.publish(OrchestratorEvent::StatusChanged {
            context_id: context_id.to_string(),
            from,
            to,
            timestamp: self.clock.now(),
        });
    }

    /// Save the current copy of a context. Failures are logged, not returned.
    async fn persist(&self, context_id: &str) {
        let context = match self.store.get(context_id).await {
            Ok(context) => context,
            Err(e) => {
                debug!(context_id, error = %e, "Nothing to persist");
                return;
            }
        };
        if let Err(e) = self.persistence.save_context(&context).await {
            warn!(context_id, error = %e, "Failed to persist context");
        }
    }
}

/// Prompt from the goal, carried snapshot summaries, and the most recent
/// messages. The newest message is always the last line.
pub fn build_prompt(context: &Context, snapshots: &[MemorySnapshot], recent: usize) -> String {
    let mut lines = Vec::new();
    if let Some(goal) = &context.goal {
        lines.push(format!("Goal: {goal}"));
    }
    if !snapshots.is_empty() {
        lines.push("Earlier in this conversation:".to_string());
        lines.extend(snapshots.iter().map(|s| format!("- {}", s.carried_text())));
    }
    lines.push("Conversation:".to_string());
    lines.extend(
        context
            .recent_messages(recent)
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content)),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::{InMemoryPersistence, MockGenerationService, StaticTaskSource};
    use crate::context::TaskRefs;
    use chrono::Duration;

    struct Fixture {
        orchestrator: Orchestrator,
        persistence: Arc<InMemoryPersistence>,
        generator: Arc<MockGenerationService>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(generator: MockGenerationService, config: OrchestratorConfig) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let persistence = Arc::new(InMemoryPersistence::new());
        let generator = Arc::new(generator);
        let orchestrator =
            Orchestrator::new(config, generator.clone(), persistence.clone(), clock.clone())
                .unwrap();
        Fixture {
            orchestrator,
            persistence,
            generator,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockGenerationService::new(), OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_first_message_creates_context_and_replies() {
        let f = fixture();
        let outcome = f
            .orchestrator
            .handle_message("hello there, what's the plan?", None, &MessagePreferences::default())
            .await
            .unwrap();

        assert!(outcome.created_context);
        assert_eq!(outcome.routing.rule, RoutingRule::NewContext);
        let reply = outcome.reply.unwrap();
        assert!(reply.ends_with("reply to: user: hello there, what's the plan?"));

        let ctx = f.orchestrator.store().get(&outcome.context_id).await.unwrap();
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.messages[1].role, MessageRole::Assistant);
        assert_eq!(f.persistence.context_count().await, 1);
        assert_eq!(f.generator.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_message() {
        let f = fixture_with(MockGenerationService::failing(), OrchestratorConfig::default());
        let outcome = f
            .orchestrator
            .handle_message("draft the release notes", None, &MessagePreferences::default())
            .await
            .unwrap();
        assert!(outcome.reply.is_none());
        assert!(outcome.generation_error.is_some());

        let ctx = f.orchestrator.store().get(&outcome.context_id).await.unwrap();
        assert_eq!(ctx.messages.len(), 1);

        let model = outcome.model.unwrap().model.model_id;
        let stats = f.orchestrator.selector.read().await.usage_stats(&model).unwrap();
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.successes, 0);
        assert_eq!(f.orchestrator.pipeline_summary().generation_failures, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_publishes_events() {
        let f = fixture();
        let mut events = f.orchestrator.subscribe();
        let ctx = f
            .orchestrator
            .create_context(ContextType::Task, Some("tax filing".into()))
            .await;
        f.orchestrator.pause(&ctx.id).await.unwrap();
        f.orchestrator.resume(&ctx.id).await.unwrap();
        f.orchestrator.archive(&ctx.id).await.unwrap();
        assert!(f.orchestrator.resume(&ctx.id).await.is_err());

        let mut types = Vec::new();
        while let Ok(event) = events.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec!["context_created", "status_changed", "status_changed", "status_changed"]
        );
    }

    #[tokio::test]
    async fn test_archived_context_drops_out_of_recommendations() {
        let f = fixture();
        let current = f
            .orchestrator
            .create_context(ContextType::Primary, Some("weekend groceries".into()))
            .await;
        let runtime = f
            .orchestrator
            .create_context(ContextType::Primary, Some("rust async runtime".into()))
            .await;
        let message = "rust async runtime tokio tasks";

        let before = f
            .orchestrator
            .get_recommendations(message, Some(&current.id), 5)
            .await;
        assert!(before.iter().any(|r| r.context_id == runtime.id));

        f.orchestrator.archive(&runtime.id).await.unwrap();
        let after = f
            .orchestrator
            .get_recommendations(message, Some(&current.id), 5)
            .await;
        assert!(after.iter().all(|r| r.context_id != runtime.id));
    }

    #[tokio::test]
    async fn test_load_context_round_trip() {
        let f = fixture();
        let ctx = f
            .orchestrator
            .create_context(ContextType::Primary, Some("garden plans".into()))
            .await;
        f.orchestrator
            .append_message(&ctx.id, MessageRole::User, "plant tomatoes in May")
            .await
            .unwrap();
        f.orchestrator.persist(&ctx.id).await;

        let other = Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(MockGenerationService::new()),
            f.persistence.clone(),
            Arc::new(ManualClock::starting_now()),
        )
        .unwrap();
        let loaded = other.load_context(&ctx.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert!(other.load_context("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_context_replaces_stale_state() {
        let f = fixture();
        let ctx = f
            .orchestrator
            .create_context(ContextType::Primary, Some("garden plans".into()))
            .await;
        f.orchestrator
            .append_message(&ctx.id, MessageRole::User, "plant tomatoes in May")
            .await
            .unwrap();
        f.orchestrator.persist(&ctx.id).await;

        let mut stale = f.orchestrator.store().context_state(&ctx.id).await.unwrap();
        stale.snapshot_count = 3;
        stale.total_tokens += 5_000;
        f.persistence.save_context_state(&stale).await.unwrap();

        let other = Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(MockGenerationService::new()),
            f.persistence.clone(),
            f.clock.clone(),
        )
        .unwrap();
        other.load_context(&ctx.id).await.unwrap().unwrap();

        let saved = f
            .persistence
            .load_context_state(&ctx.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved, other.store().context_state(&ctx.id).await.unwrap());
        assert_eq!(saved.snapshot_count, 0);
        assert_eq!(saved.active_message_count, 1);
    }

    #[tokio::test]
    async fn test_maintenance_archives_and_refreshes_tasks() {
        let mut config = OrchestratorConfig::default();
        config.auto_pause_idle_hours = Some(2);
        let f = fixture_with(MockGenerationService::new(), config);
        let tasks = Arc::new(StaticTaskSource::new());
        let orchestrator = f.orchestrator.with_task_source(tasks.clone());

        let stale = orchestrator.create_context(ContextType::Primary, None).await;
        f.clock.advance(Duration::days(31));
        let idle = orchestrator.create_context(ContextType::Task, None).await;
        tasks
            .set(
                &idle.id,
                TaskRefs {
                    pending: vec!["t1".into()],
                    active: vec![],
                },
            )
            .await;
        f.clock.advance(Duration::hours(3));

        let report = orchestrator.run_maintenance().await;
        assert_eq!(report.archived, vec![stale.id.clone()]);
        assert_eq!(report.paused.len(), 2);
        assert_eq!(report.tasks_refreshed, 1);

        let idle = orchestrator.store().get(&idle.id).await.unwrap();
        assert_eq!(idle.status, ContextStatus::Paused);
        assert_eq!(idle.tasks.pending, vec!["t1"]);
    }

    #[test]
    fn test_prompt_layout() {
        let now = chrono::Utc::now();
        let mut ctx = Context::new(ContextType::Primary, Some("trip".into()), now);
        for i in 0..4 {
            ctx.push_message(ContextMessage::new(MessageRole::User, &format!("m{i}"), 1, now));
        }
        let prompt = build_prompt(&ctx, &[], 2);
        assert_eq!(prompt, "Goal: trip\nConversation:\nuser: m2\nuser: m3");
    }
}
