// ciris-runtime/src/handlers/mod.rs
// ============================================================================
// Module: Action Handlers
// Description: Handler contract, dispatcher, and shared handler machinery.
// Purpose: Execute exactly one audited effect per selected action.
// Dependencies: ciris-core, ciris-bus, ciris-audit
// ============================================================================

//! ## Overview
//! Every handler has the same shape: validate typed params, decapsulate
//! secret references, perform the effect through its bus, and describe the
//! resulting state changes. The dispatcher owns the invariants around that
//! shape: exactly one audit event per executed action, thought and task
//! status updates, follow-up persistence, and escalation of fatal or
//! security-class failures. Handlers hold no state between invocations.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod control;
pub mod external;
pub mod memory;
pub mod terminal;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ciris_audit::AuditChain;
use ciris_bus::BusBundle;
use ciris_bus::BusError;
use ciris_core::ActionKind;
use ciris_core::ActionParams;
use ciris_core::AuditEvent;
use ciris_core::AuditEventType;
use ciris_core::Clock;
use ciris_core::ErrorClass;
use ciris_core::ScheduledTaskStore;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::TaskOutcome;
use ciris_core::TaskStatus;
use ciris_core::TaskStore;
use ciris_core::Thought;
use ciris_core::ThoughtStatus;
use ciris_core::ThoughtStore;
use serde_json::json;

use crate::shutdown::ShutdownHandle;

// ============================================================================
// SECTION: Handler Context
// ============================================================================

/// Dependencies shared by every handler invocation.
pub struct HandlerContext {
    /// The ten typed buses; the only path to services.
    pub buses: Arc<BusBundle>,
    /// Task persistence.
    pub tasks: Arc<dyn TaskStore>,
    /// Thought persistence.
    pub thoughts: Arc<dyn ThoughtStore>,
    /// Scheduled task persistence.
    pub scheduled: Arc<dyn ScheduledTaskStore>,
    /// Audit chain for action events and task signing.
    pub audit: Arc<AuditChain>,
    /// Clock for timestamps.
    pub clock: Arc<dyn Clock>,
    /// Graceful shutdown intent.
    pub shutdown: ShutdownHandle,
}

// ============================================================================
// SECTION: Handler Contract
// ============================================================================

/// State changes a handler requests after performing its effect.
pub struct HandlerOutcome {
    /// Status the evaluated thought transitions to.
    pub thought_status: ThoughtStatus,
    /// Task transition to apply, when the action changes the task.
    pub task_update: Option<(TaskStatus, Option<TaskOutcome>)>,
    /// Follow-up thought to persist, for non-terminal actions.
    pub follow_up: Option<Thought>,
}

impl HandlerOutcome {
    /// Outcome completing the thought with a follow-up.
    #[must_use]
    pub const fn completed_with_follow_up(follow_up: Thought) -> Self {
        Self {
            thought_status: ThoughtStatus::Completed,
            task_update: None,
            follow_up: Some(follow_up),
        }
    }

    /// Outcome completing the thought with no further effects.
    #[must_use]
    pub const fn completed() -> Self {
        Self {
            thought_status: ThoughtStatus::Completed,
            task_update: None,
            follow_up: None,
        }
    }
}

/// Executor for one action kind.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Action kind this handler executes.
    fn kind(&self) -> ActionKind;

    /// Performs the action's effect through the buses.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the action cannot be performed; the
    /// dispatcher marks the thought failed and creates no follow-up.
    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError>;
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes selected actions to their handlers and enforces the common shape.
pub struct HandlerDispatcher {
    /// Handlers by action kind.
    handlers: BTreeMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl HandlerDispatcher {
    /// Creates a dispatcher with the ten default handlers.
    #[must_use]
    pub fn with_default_handlers() -> Self {
        let handlers: Vec<Arc<dyn ActionHandler>> = vec![
            Arc::new(external::SpeakHandler),
            Arc::new(external::ObserveHandler),
            Arc::new(external::ToolHandler),
            Arc::new(control::RejectHandler),
            Arc::new(control::PonderHandler),
            Arc::new(control::DeferHandler),
            Arc::new(memory::MemorizeHandler),
            Arc::new(memory::RecallHandler),
            Arc::new(memory::ForgetHandler),
            Arc::new(terminal::TaskCompleteHandler),
        ];
        Self {
            handlers: handlers.into_iter().map(|handler| (handler.kind(), handler)).collect(),
        }
    }

    /// Dispatches a selected action for an evaluated thought.
    ///
    /// On success the thought, task, follow-up, and action audit event are
    /// all recorded. On failure the thought is marked failed, no follow-up is
    /// created, the failure is audited, and fatal or security-class failures
    /// escalate.
    ///
    /// # Errors
    ///
    /// Returns the handler's [`ServiceError`] after recording it.
    pub async fn dispatch(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<(), ServiceError> {
        let kind = action.kind();
        let handler = self.handlers.get(&kind).ok_or_else(|| {
            ServiceError::validation(format!("no handler registered for action {kind}"))
        })?;

        // A decapsulation failure follows the handler failure policy.
        let (action, result) = match decapsulate_action(ctx, action.clone()).await {
            Ok(decapsulated) => {
                let result = handler.handle(ctx, thought, &decapsulated).await;
                (decapsulated, result)
            }
            Err(error) => (action.clone(), Err(error)),
        };
        let now = ctx.clock.now();

        match result {
            Ok(outcome) => {
                if let Some((status, task_outcome)) = &outcome.task_update {
                    ctx.tasks
                        .update_task_status(
                            &thought.source_task_id,
                            *status,
                            task_outcome.as_ref(),
                            now,
                        )
                        .map_err(ServiceError::from)?;
                }
                if let Some(follow_up) = &outcome.follow_up {
                    ctx.thoughts.add_thought(follow_up).map_err(ServiceError::from)?;
                    audit(ctx, AuditEventType::ThoughtCreated, json!({
                        "thought_id": follow_up.thought_id,
                        "task_id": follow_up.source_task_id,
                        "round_number": follow_up.round_number,
                    }));
                }
                ctx.thoughts
                    .update_thought_status(
                        &thought.thought_id,
                        outcome.thought_status,
                        Some(&action),
                        now,
                    )
                    .map_err(ServiceError::from)?;
                audit(ctx, AuditEventType::for_action(kind), json!({
                    "task_id": thought.source_task_id,
                    "thought_id": thought.thought_id,
                    "success": true,
                }));
                Ok(())
            }
            Err(error) => {
                if let Err(status_error) = ctx.thoughts.update_thought_status(
                    &thought.thought_id,
                    ThoughtStatus::Failed,
                    Some(&action),
                    now,
                ) {
                    tracing::error!(error = %status_error, "failed to mark thought failed");
                }
                audit(ctx, AuditEventType::for_action(kind), json!({
                    "task_id": thought.source_task_id,
                    "thought_id": thought.thought_id,
                    "success": false,
                    "error": error.to_string(),
                    "error_class": error.class,
                }));
                self.escalate(ctx, thought, &error);
                Err(error)
            }
        }
    }

    /// Audits and escalates fatal or security-class failures.
    fn escalate(&self, ctx: &HandlerContext, thought: &Thought, error: &ServiceError) {
        match error.class {
            ErrorClass::Fatal => {
                audit(ctx, AuditEventType::FatalError, json!({
                    "thought_id": thought.thought_id,
                    "error": error.to_string(),
                }));
                ctx.shutdown.request(format!("fatal failure: {error}"));
            }
            ErrorClass::SecurityViolation => {
                audit(ctx, AuditEventType::SecurityViolation, json!({
                    "thought_id": thought.thought_id,
                    "error": error.to_string(),
                }));
            }
            _ => {}
        }
    }
}

// ============================================================================
// SECTION: Shared Handler Helpers
// ============================================================================

/// Records an audit event, logging rather than failing the dispatch.
fn audit(ctx: &HandlerContext, event_type: AuditEventType, payload: serde_json::Value) {
    let event = AuditEvent::new(event_type, "handler", payload);
    if let Err(error) = ctx.audit.append(&event) {
        tracing::error!(%error, "audit append failed");
        ctx.shutdown.request(format!("audit chain failure: {error}"));
    }
}

/// Maps a bus failure onto a service error.
pub(crate) fn bus_error(error: BusError) -> ServiceError {
    ServiceError::new(error.class(), error.to_string())
}

/// Decapsulates secret references in outbound action parameters.
///
/// A missing secrets provider is not an error; content passes through.
async fn decapsulate_action(
    ctx: &HandlerContext,
    mut action: SelectedAction,
) -> Result<SelectedAction, ServiceError> {
    let kind = action.kind();
    match &mut action.params {
        ActionParams::Speak(params) => {
            params.content = decapsulate_text(ctx, kind, &params.content).await?;
        }
        ActionParams::Tool(params) => {
            if let serde_json::Value::Object(map) = &mut params.arguments {
                for value in map.values_mut() {
                    if let serde_json::Value::String(text) = value {
                        *text = decapsulate_text(ctx, kind, text).await?;
                    }
                }
            }
        }
        _ => {}
    }
    Ok(action)
}

/// Decapsulates one text field, tolerating a missing secrets provider.
async fn decapsulate_text(
    ctx: &HandlerContext,
    kind: ActionKind,
    content: &str,
) -> Result<String, ServiceError> {
    match ctx.buses.secrets.decapsulate(content, kind, "handler").await {
        Ok(restored) => Ok(restored),
        Err(BusError::NoProvider { .. }) => Ok(content.to_string()),
        Err(error) => Err(bus_error(error)),
    }
}
