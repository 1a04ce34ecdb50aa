// ciris-runtime/src/processor.rs
// ============================================================================
// Module: Cognitive Processor
// Description: State machine, thought queue, and the round loop.
// Purpose: Drive thoughts through evaluation and dispatch in bounded rounds.
// Dependencies: ciris-core, ciris-audit, ciris-registry, tokio
// ============================================================================

//! ## Overview
//! The processor runs a single controller loop over a cognitive state
//! machine. Within a round, thought evaluations and handler dispatches run
//! concurrently with bounded parallelism; between rounds the loop sleeps or
//! waits for a wake event. Pause, resume, and single-step serve operator
//! tooling; a shutdown intent drains in-flight work within a grace window
//! and abandons the rest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ciris_audit::AuditError;
use ciris_core::ActionParams;
use ciris_core::AuditEvent;
use ciris_core::AuditEventType;
use ciris_core::CorrelationStore;
use ciris_core::DmaContext;
use ciris_core::DmaPipeline;
use ciris_core::GraphNode;
use ciris_core::GraphScope;
use ciris_core::GraphStore;
use ciris_core::IDENTITY_ROOT_ID;
use ciris_core::MemorizeParams;
use ciris_core::NodeId;
use ciris_core::NodeType;
use ciris_core::QueueStatus;
use ciris_core::SelectedAction;
use ciris_core::ServiceType;
use ciris_core::Task;
use ciris_core::TaskContext;
use ciris_core::TaskId;
use ciris_core::TaskStatus;
use ciris_core::Thought;
use ciris_core::ThoughtContext;
use ciris_core::ThoughtId;
use ciris_core::ThoughtStatus;
use ciris_core::ThoughtType;
use ciris_core::interfaces::StoreError;
use ciris_registry::ServiceRegistry;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::handlers::HandlerContext;
use crate::handlers::HandlerDispatcher;
use crate::shutdown::ShutdownHandle;

// ============================================================================
// SECTION: Cognitive State
// ============================================================================

/// Cognitive state of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveState {
    /// Initial and terminal state; nothing runs.
    Shutdown,
    /// Startup self-checks.
    Wakeup,
    /// Normal thought processing.
    Work,
    /// Work with elevated exploration.
    Play,
    /// Low-rate maintenance.
    Solitude,
    /// Offline memory consolidation; no external effects.
    Dream,
}

impl CognitiveState {
    /// Returns true when the transition to `next` is legal.
    ///
    /// Any state may transition to shutdown on a signal.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        if matches!(next, Self::Shutdown) {
            return true;
        }
        matches!(
            (self, next),
            (Self::Shutdown, Self::Wakeup)
                | (Self::Wakeup, Self::Work)
                | (Self::Work, Self::Solitude | Self::Dream | Self::Play)
                | (Self::Solitude | Self::Play | Self::Dream, Self::Work)
        )
    }
}

impl fmt::Display for CognitiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Shutdown => "shutdown",
            Self::Wakeup => "wakeup",
            Self::Work => "work",
            Self::Play => "play",
            Self::Solitude => "solitude",
            Self::Dream => "dream",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Processor Settings
// ============================================================================

/// Bounded parallelism applied to in-round evaluation.
const ROUND_PARALLELISM: usize = 8;
/// Consecutive idle work rounds before the processor drops into solitude.
const IDLE_ROUNDS_TO_SOLITUDE: u32 = 5;
/// Lookahead window for due scheduled tasks, in milliseconds.
const SCHEDULED_LOOKAHEAD_MILLIS: i64 = 1_000;
/// Retention window for ephemeral correlations, in milliseconds.
const CORRELATION_RETENTION_MILLIS: i64 = 24 * 60 * 60 * 1_000;

/// Processor loop settings derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorSettings {
    /// Cap on concurrently active thoughts.
    pub max_active_thoughts: usize,
    /// Controller sleep between rounds.
    pub round_delay: Duration,
    /// Grace window for in-flight work at shutdown.
    pub shutdown_grace: Duration,
    /// Startup wait for required services.
    pub readiness_timeout: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_active_thoughts: 50,
            round_delay: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
            readiness_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Processor errors.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Requested cognitive transition is illegal.
    #[error("illegal cognitive transition: {from} -> {to}")]
    IllegalTransition {
        /// Current state.
        from: CognitiveState,
        /// Requested state.
        to: CognitiveState,
    },
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Audit chain failure.
    #[error(transparent)]
    Audit(#[from] AuditError),
    /// Startup self-check failure.
    #[error("wakeup self-check failed: {0}")]
    Wakeup(String),
    /// Processor state lock poisoned.
    #[error("processor lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Processor
// ============================================================================

/// The cognitive processor: one controller loop over the state machine.
pub struct CognitiveProcessor {
    /// Current cognitive state.
    state: RwLock<CognitiveState>,
    /// Operator pause flag.
    paused: AtomicBool,
    /// Evaluation pipeline.
    pipeline: Arc<DmaPipeline>,
    /// Action dispatcher.
    dispatcher: Arc<HandlerDispatcher>,
    /// Handler dependencies (buses, stores, audit, clock, shutdown).
    ctx: Arc<HandlerContext>,
    /// Graph store for the identity root and dream consolidation.
    graph: Arc<dyn GraphStore>,
    /// Correlation store for solitude compaction and dream statistics.
    correlations: Arc<dyn CorrelationStore>,
    /// Provider directory for readiness waits.
    registry: Arc<ServiceRegistry>,
    /// Loop settings.
    settings: ProcessorSettings,
    /// Wake signal for the controller loop.
    notify: Notify,
    /// Bounded parallelism for in-round work.
    semaphore: Arc<Semaphore>,
    /// Shutdown intent shared with handlers and operators.
    shutdown: ShutdownHandle,
}

impl CognitiveProcessor {
    /// Creates a processor in the shutdown state.
    #[must_use]
    pub fn new(
        pipeline: Arc<DmaPipeline>,
        dispatcher: Arc<HandlerDispatcher>,
        ctx: Arc<HandlerContext>,
        graph: Arc<dyn GraphStore>,
        correlations: Arc<dyn CorrelationStore>,
        registry: Arc<ServiceRegistry>,
        settings: ProcessorSettings,
    ) -> Self {
        let shutdown = ctx.shutdown.clone();
        Self {
            state: RwLock::new(CognitiveState::Shutdown),
            paused: AtomicBool::new(false),
            pipeline,
            dispatcher,
            ctx,
            graph,
            correlations,
            registry,
            settings,
            notify: Notify::new(),
            semaphore: Arc::new(Semaphore::new(ROUND_PARALLELISM)),
            shutdown,
        }
    }

    /// Returns the current cognitive state.
    #[must_use]
    pub fn state(&self) -> CognitiveState {
        self.state.read().map_or(CognitiveState::Shutdown, |state| *state)
    }

    /// Returns the shutdown handle.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Wakes the controller loop early.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Pauses thought processing.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("processor paused");
    }

    /// Resumes thought processing.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_one();
        tracing::info!("processor resumed");
    }

    /// Returns true while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Processes one round inline; serves the operator step control.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when round bookkeeping fails.
    pub async fn single_step(&self) -> Result<usize, ProcessorError> {
        self.run_round(self.settings.max_active_thoughts).await
    }

    /// Returns the current queue snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when the queue cannot be read.
    pub fn queue_status(&self) -> Result<QueueStatus, ProcessorError> {
        let pending = self.ctx.thoughts.list_pending_thoughts(10_000)?.len();
        let active = self.ctx.thoughts.count_active_thoughts()?;
        Ok(QueueStatus {
            pending,
            processing: active.saturating_sub(pending),
        })
    }

    /// Requests a cognitive transition, auditing it.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::IllegalTransition`] when the transition
    /// violates the state machine.
    pub fn transition(&self, next: CognitiveState) -> Result<(), ProcessorError> {
        let mut state = self.state.write().map_err(|_| ProcessorError::Poisoned)?;
        if !state.can_transition_to(next) {
            return Err(ProcessorError::IllegalTransition {
                from: *state,
                to: next,
            });
        }
        let from = *state;
        *state = next;
        drop(state);
        tracing::info!(%from, to = %next, "cognitive state transition");
        self.audit(AuditEventType::StateTransition, json!({
            "from": from,
            "to": next,
        }));
        self.notify.notify_one();
        Ok(())
    }

    /// Runs the controller loop until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when startup fails; loop-time failures are
    /// audited and converted into a shutdown instead of an error return.
    pub async fn run(&self) -> Result<(), ProcessorError> {
        self.transition(CognitiveState::Wakeup)?;
        if let Err(error) = self.wakeup().await {
            self.audit(AuditEventType::FatalError, json!({
                "error": error.to_string(),
                "phase": "wakeup",
            }));
            self.transition(CognitiveState::Shutdown)?;
            return Err(error);
        }
        self.transition(CognitiveState::Work)?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut idle_rounds = 0u32;
        while !self.shutdown.is_requested() {
            if !self.is_paused() {
                let result = match self.state() {
                    CognitiveState::Work | CognitiveState::Play => {
                        self.run_round(self.settings.max_active_thoughts).await
                    }
                    CognitiveState::Solitude => self.solitude_round().await,
                    CognitiveState::Dream => {
                        let result = self.dream_round().await;
                        if self.state() == CognitiveState::Dream {
                            self.transition(CognitiveState::Work)?;
                        }
                        result
                    }
                    CognitiveState::Shutdown | CognitiveState::Wakeup => Ok(0),
                };
                let processed = match result {
                    Ok(processed) => processed,
                    Err(error) => {
                        tracing::error!(%error, "round failed");
                        if matches!(error, ProcessorError::Audit(_)) {
                            self.shutdown.request(format!("audit failure in round: {error}"));
                        }
                        0
                    }
                };

                // Activity-driven movement between work and solitude.
                match self.state() {
                    CognitiveState::Work => {
                        idle_rounds = if processed == 0 { idle_rounds + 1 } else { 0 };
                        if idle_rounds >= IDLE_ROUNDS_TO_SOLITUDE {
                            idle_rounds = 0;
                            self.transition(CognitiveState::Solitude)?;
                        }
                    }
                    CognitiveState::Solitude => {
                        if self.has_waiting_work()? {
                            self.transition(CognitiveState::Work)?;
                        }
                    }
                    _ => idle_rounds = 0,
                }
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                () = self.notify.notified() => {}
                () = tokio::time::sleep(self.settings.round_delay) => {}
            }
        }

        let reason = self.shutdown.reason().unwrap_or_else(|| "signal".to_string());
        self.audit(AuditEventType::ShutdownRequested, json!({
            "reason": reason,
        }));
        self.transition(CognitiveState::Shutdown)?;
        Ok(())
    }

    /// Returns true when tasks or thoughts are waiting for a work round.
    fn has_waiting_work(&self) -> Result<bool, ProcessorError> {
        if !self.ctx.thoughts.list_pending_thoughts(1)?.is_empty() {
            return Ok(true);
        }
        Ok(!self.ctx.tasks.list_tasks_by_status(TaskStatus::Pending)?.is_empty())
    }

    // ------------------------------------------------------------------
    // Wakeup
    // ------------------------------------------------------------------

    /// Runs the scripted startup self-checks.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when persistence or the audit chain fails
    /// integrity checks; missing optional services only log.
    async fn wakeup(&self) -> Result<(), ProcessorError> {
        let now = self.ctx.clock.now();
        let recovered = self.ctx.thoughts.recover_processing_thoughts(now)?;
        if recovered > 0 {
            tracing::info!(recovered, "recovered in-flight thoughts from previous run");
        }

        if self.graph.get_node(GraphScope::Identity, &NodeId::new(IDENTITY_ROOT_ID))?.is_none() {
            tracing::info!("no identity root; seeding default");
            self.graph.put_node(&GraphNode::new(
                NodeId::new(IDENTITY_ROOT_ID),
                NodeType::Identity,
                GraphScope::Identity,
                json!({
                    "name": "ciris",
                    "purpose": "moral-reasoning agent",
                }),
            ))?;
        }

        if let ciris_audit::VerificationReport::Invalid {
            first_invalid,
            kind,
        } = self.ctx.audit.verify_all()?
        {
            return Err(ProcessorError::Wakeup(format!(
                "audit chain invalid at sequence {first_invalid}: {kind}"
            )));
        }

        let missing = self
            .registry
            .wait_ready(
                &[ServiceType::Llm, ServiceType::Communication, ServiceType::Memory],
                self.settings.readiness_timeout,
            )
            .await;
        if !missing.is_empty() {
            tracing::warn!(?missing, "proceeding without some services");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------

    /// Runs one processing round over at most `limit` thoughts.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when round bookkeeping fails; individual
    /// thought failures are recorded on the thoughts themselves.
    async fn run_round(&self, limit: usize) -> Result<usize, ProcessorError> {
        self.trigger_due_scheduled()?;
        self.activate_pending_tasks()?;
        self.seed_initial_thoughts()?;

        let now = self.ctx.clock.now();
        let batch = self.ctx.thoughts.list_pending_thoughts(limit)?;
        for thought in &batch {
            self.ctx.thoughts.update_thought_status(
                &thought.thought_id,
                ThoughtStatus::Processing,
                None,
                now,
            )?;
        }

        let identity_root =
            self.graph.get_node(GraphScope::Identity, &NodeId::new(IDENTITY_ROOT_ID))?;
        let exploration = self.state() == CognitiveState::Play;

        let mut join_set: JoinSet<ThoughtId> = JoinSet::new();
        let mut in_flight: Vec<ThoughtId> = Vec::with_capacity(batch.len());
        for thought in batch {
            in_flight.push(thought.thought_id.clone());
            let pipeline = Arc::clone(&self.pipeline);
            let dispatcher = Arc::clone(&self.dispatcher);
            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&self.semaphore);
            let identity_root = identity_root.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let thought_id = thought.thought_id.clone();
                process_thought(&pipeline, &dispatcher, &ctx, thought, identity_root, exploration)
                    .await;
                thought_id
            });
        }

        let mut processed = 0usize;
        loop {
            let next = if self.shutdown.is_requested() {
                match tokio::time::timeout(self.settings.shutdown_grace, join_set.join_next())
                    .await
                {
                    Ok(next) => next,
                    Err(_) => {
                        join_set.abort_all();
                        self.abandon_in_flight(&in_flight);
                        break;
                    }
                }
            } else {
                join_set.join_next().await
            };
            match next {
                Some(Ok(thought_id)) => {
                    in_flight.retain(|id| id != &thought_id);
                    processed += 1;
                }
                Some(Err(join_error)) => {
                    tracing::error!(error = %join_error, "thought task panicked or was aborted");
                }
                None => break,
            }
        }

        self.record_round_metric(processed).await;
        Ok(processed)
    }

    /// Records the per-round throughput metric when telemetry is available.
    async fn record_round_metric(&self, processed: usize) {
        if processed == 0 {
            return;
        }
        let mut tags = std::collections::BTreeMap::new();
        tags.insert("state".to_string(), self.state().to_string());
        #[allow(clippy::cast_precision_loss, reason = "Round sizes are far below 2^52.")]
        let value = processed as f64;
        if let Err(error) =
            self.ctx.buses.telemetry.record_metric("processor.thoughts_processed", value, &tags).await
        {
            tracing::debug!(%error, "round metric not recorded");
        }
    }

    /// Marks abandoned in-flight thoughts failed at shutdown.
    fn abandon_in_flight(&self, in_flight: &[ThoughtId]) {
        let now = self.ctx.clock.now();
        for thought_id in in_flight {
            if let Err(error) = self.ctx.thoughts.update_thought_status(
                thought_id,
                ThoughtStatus::Failed,
                None,
                now,
            ) {
                tracing::error!(%thought_id, %error, "failed to abandon thought");
            }
        }
    }

    /// Low-rate maintenance round for the solitude state.
    async fn solitude_round(&self) -> Result<usize, ProcessorError> {
        let cutoff = self.ctx.clock.now().saturating_add_millis(-CORRELATION_RETENTION_MILLIS);
        let compacted = self.correlations.compact_correlations(cutoff)?;
        if compacted > 0 {
            tracing::debug!(compacted, "compacted expired correlations");
        }
        self.run_round(1).await
    }

    /// Offline consolidation round for the dream state.
    ///
    /// Emits a memorize-only action through the normal dispatcher so the
    /// exactly-one-audit-event invariant holds; no external bus is touched.
    async fn dream_round(&self) -> Result<usize, ProcessorError> {
        let now = self.ctx.clock.now();
        let since = now.saturating_add_millis(-CORRELATION_RETENTION_MILLIS);
        let recent = self.correlations.query_correlations(
            since,
            now,
            None,
            &std::collections::BTreeMap::new(),
        )?;

        let task_id = TaskId::new(format!("task-{}", Uuid::new_v4()));
        let task = Task::new(
            task_id.clone(),
            "Consolidate recent experience into graph memory.",
            0,
            TaskContext::default(),
            now,
        );
        self.ctx.tasks.add_task(&task)?;
        self.ctx.tasks.update_task_status(&task_id, TaskStatus::Active, None, now)?;

        let thought = Thought {
            thought_type: ThoughtType::Reflection,
            status: ThoughtStatus::Processing,
            ..Thought::seed(
                ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
                task_id.clone(),
                format!("Dream consolidation over {} recent correlations.", recent.len()),
                ThoughtContext::default(),
                now,
            )
        };
        self.ctx.thoughts.add_thought(&thought)?;
        self.audit(AuditEventType::ThoughtCreated, json!({
            "thought_id": thought.thought_id,
            "task_id": task_id,
            "round_number": 0,
        }));

        let action = SelectedAction::new(
            ActionParams::Memorize(MemorizeParams {
                node: GraphNode::new(
                    NodeId::new(format!("dream/consolidation-{}", now.unix_millis())),
                    NodeType::Concept,
                    GraphScope::Local,
                    json!({
                        "correlations_reviewed": recent.len(),
                        "consolidated_at": now,
                    }),
                ),
                authority_signature: None,
            }),
            "consolidating recent correlations into a durable summary".to_string(),
        );
        let dispatched = self.dispatcher.dispatch(&self.ctx, &thought, &action).await;
        if let Err(error) = dispatched {
            tracing::warn!(%error, "dream consolidation failed");
        }
        self.ctx.tasks.update_task_status(
            &task_id,
            TaskStatus::Completed,
            Some(&ciris_core::TaskOutcome::completed("dream consolidation round")),
            self.ctx.clock.now(),
        )?;
        Ok(1)
    }

    // ------------------------------------------------------------------
    // Round bookkeeping
    // ------------------------------------------------------------------

    /// Turns due scheduled tasks into ordinary tasks.
    fn trigger_due_scheduled(&self) -> Result<(), ProcessorError> {
        let now = self.ctx.clock.now();
        for scheduled in self.ctx.scheduled.due_scheduled(now, SCHEDULED_LOOKAHEAD_MILLIS)? {
            let task_id = TaskId::new(format!("task-{}", Uuid::new_v4()));
            let task = Task::new(
                task_id.clone(),
                scheduled.trigger_prompt.clone(),
                0,
                TaskContext::default(),
                now,
            );
            self.ctx.tasks.add_task(&task)?;
            self.ctx.scheduled.mark_triggered(&scheduled.id, now)?;
            self.audit(AuditEventType::TaskCreated, json!({
                "task_id": task_id,
                "scheduled_task_id": scheduled.id,
            }));
        }
        Ok(())
    }

    /// Activates pending tasks up to the active-thought capacity.
    fn activate_pending_tasks(&self) -> Result<(), ProcessorError> {
        let active = self.ctx.thoughts.count_active_thoughts()?;
        let mut capacity = self.settings.max_active_thoughts.saturating_sub(active);
        if capacity == 0 {
            return Ok(());
        }
        let now = self.ctx.clock.now();
        for task in self.ctx.tasks.list_tasks_by_status(TaskStatus::Pending)? {
            if capacity == 0 {
                break;
            }
            self.ctx.tasks.update_task_status(&task.task_id, TaskStatus::Active, None, now)?;
            capacity -= 1;
        }
        Ok(())
    }

    /// Seeds an initial thought for every active task with none.
    fn seed_initial_thoughts(&self) -> Result<(), ProcessorError> {
        let now = self.ctx.clock.now();
        for task in self.ctx.tasks.list_tasks_by_status(TaskStatus::Active)? {
            if !self.ctx.thoughts.list_thoughts_for_task(&task.task_id)?.is_empty() {
                continue;
            }
            let thought = Thought::seed(
                ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
                task.task_id.clone(),
                task.description.clone(),
                ThoughtContext {
                    channel_id: task.context.channel_id.clone(),
                    originator_id: task.context.originator_id.clone(),
                    correlation_id: task.context.correlation_id.clone(),
                    ..ThoughtContext::default()
                },
                now,
            );
            self.ctx.thoughts.add_thought(&thought)?;
            self.audit(AuditEventType::ThoughtCreated, json!({
                "thought_id": thought.thought_id,
                "task_id": task.task_id,
                "round_number": 0,
            }));
        }
        Ok(())
    }

    /// Records a processor-originated audit event.
    fn audit(&self, event_type: AuditEventType, payload: serde_json::Value) {
        let event = AuditEvent::new(event_type, "processor", payload);
        if let Err(error) = self.ctx.audit.append(&event) {
            tracing::error!(%error, "audit append failed");
            self.shutdown.request(format!("audit chain failure: {error}"));
        }
    }
}

// ============================================================================
// SECTION: Per-Thought Processing
// ============================================================================

/// Evaluates one thought and dispatches its selected action.
async fn process_thought(
    pipeline: &DmaPipeline,
    dispatcher: &HandlerDispatcher,
    ctx: &HandlerContext,
    thought: Thought,
    identity_root: Option<GraphNode>,
    exploration: bool,
) {
    let task = match ctx.tasks.get_task(&thought.source_task_id) {
        Ok(Some(task)) => task,
        Ok(None) => {
            tracing::error!(task_id = %thought.source_task_id, "thought references missing task");
            fail_thought(ctx, &thought.thought_id);
            return;
        }
        Err(error) => {
            tracing::error!(%error, "failed to load task for thought");
            fail_thought(ctx, &thought.thought_id);
            return;
        }
    };

    let dma_context = DmaContext {
        task,
        identity_root,
        exploration,
    };
    let outcome = pipeline.evaluate(&thought, &dma_context).await;

    let mut updated_context = thought.context.clone();
    updated_context.epistemic_data.extend(outcome.epistemic_data.iter().cloned());
    if let Some(conscience) = &outcome.conscience {
        if conscience.overridden {
            updated_context.override_reason = conscience.override_reason.clone();
        }
    }
    let now = ctx.clock.now();
    if let Err(error) =
        ctx.thoughts.update_thought_context(&thought.thought_id, &updated_context, now)
    {
        tracing::error!(%error, "failed to persist thought context");
    }
    let thought = Thought {
        context: updated_context,
        ..thought
    };

    append_audit(ctx, AuditEventType::DmaCompleted, json!({
        "thought_id": thought.thought_id,
        "task_id": thought.source_task_id,
        "action": thought_action_label(&outcome.action),
        "retried": outcome.retried,
    }));
    if outcome.retried {
        let reason = outcome
            .conscience
            .as_ref()
            .and_then(|conscience| conscience.override_reason.clone())
            .unwrap_or_default();
        append_audit(ctx, AuditEventType::ConscienceOverridden, json!({
            "thought_id": thought.thought_id,
            "overridden": true,
            "override_reason": reason,
            "final_disagreement": outcome.final_disagreement,
        }));
    }

    // Dispatch errors are already recorded against the thought.
    let _ = dispatcher.dispatch(ctx, &thought, &outcome.action).await;
}

/// Returns the action label for audit payloads.
fn thought_action_label(action: &SelectedAction) -> String {
    action.kind().to_string()
}

/// Marks a thought failed outside the dispatcher path.
fn fail_thought(ctx: &HandlerContext, thought_id: &ThoughtId) {
    let now = ctx.clock.now();
    if let Err(error) =
        ctx.thoughts.update_thought_status(thought_id, ThoughtStatus::Failed, None, now)
    {
        tracing::error!(%thought_id, %error, "failed to mark thought failed");
    }
}

/// Records an audit event from the round worker.
fn append_audit(ctx: &HandlerContext, event_type: AuditEventType, payload: serde_json::Value) {
    let event = AuditEvent::new(event_type, "processor", payload);
    if let Err(error) = ctx.audit.append(&event) {
        tracing::error!(%error, "audit append failed");
        ctx.shutdown.request(format!("audit chain failure: {error}"));
    }
}
