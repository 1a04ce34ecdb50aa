// ciris-runtime/src/handlers/control.rs
// ============================================================================
// Module: Control Action Handlers
// Description: Reject, ponder, and defer handlers.
// Purpose: Steer the task lifecycle without external effects.
// Dependencies: ciris-core, crate::handlers
// ============================================================================

//! ## Overview
//! Control actions steer the reasoning loop itself. Reject fails the task
//! with a reason, ponder deepens the thought chain, and defer hands the task
//! to a Wise Authority, optionally scheduling a future retrigger.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use ciris_core::ActionKind;
use ciris_core::ActionParams;
use ciris_core::ScheduleTrigger;
use ciris_core::ScheduledTask;
use ciris_core::ScheduledTaskId;
use ciris_core::ScheduledTaskStatus;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::TaskStatus;
use ciris_core::Thought;
use ciris_core::ThoughtId;
use ciris_core::ThoughtStatus;
use ciris_core::ThoughtType;
use uuid::Uuid;

use crate::handlers::ActionHandler;
use crate::handlers::HandlerContext;
use crate::handlers::HandlerOutcome;

// ============================================================================
// SECTION: Reject Handler
// ============================================================================

/// Terminates the task as failed with a reason.
pub struct RejectHandler;

#[async_trait]
impl ActionHandler for RejectHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Reject
    }

    async fn handle(
        &self,
        _ctx: &HandlerContext,
        _thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Reject(params) = &action.params else {
            return Err(ServiceError::validation("reject handler received non-reject params"));
        };
        tracing::info!(reason = %params.reason, "task rejected");
        Ok(HandlerOutcome {
            thought_status: ThoughtStatus::Completed,
            task_update: Some((TaskStatus::Failed, None)),
            follow_up: None,
        })
    }
}

// ============================================================================
// SECTION: Ponder Handler
// ============================================================================

/// Deepens the thought chain with the open questions.
pub struct PonderHandler;

#[async_trait]
impl ActionHandler for PonderHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Ponder
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Ponder(params) = &action.params else {
            return Err(ServiceError::validation("ponder handler received non-ponder params"));
        };

        let now = ctx.clock.now();
        ctx.thoughts
            .increment_ponder_count(&thought.thought_id, now)
            .map_err(ServiceError::from)?;

        let mut follow_up = thought.follow_up(
            ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
            ThoughtType::Standard,
            format!("Pondering: {}", params.questions.join("; ")),
            thought.context.clone(),
            now,
        );
        follow_up.ponder_count = thought.ponder_count + 1;
        Ok(HandlerOutcome::completed_with_follow_up(follow_up))
    }
}

// ============================================================================
// SECTION: Defer Handler
// ============================================================================

/// Hands the task to a Wise Authority and optionally schedules a retrigger.
pub struct DeferHandler;

#[async_trait]
impl ActionHandler for DeferHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Defer
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Defer(params) = &action.params else {
            return Err(ServiceError::validation("defer handler received non-defer params"));
        };

        // Deferral stands even when no authority is reachable; the task is
        // parked either way.
        if let Err(error) = ctx
            .buses
            .wise_authority
            .submit_deferral(&thought.source_task_id, &params.reason)
            .await
        {
            tracing::warn!(task_id = %thought.source_task_id, %error, "deferral not delivered");
        }

        if let Some(defer_until) = params.defer_until {
            let scheduled = ScheduledTask {
                id: ScheduledTaskId::new(format!("sched-{}", Uuid::new_v4())),
                goal_description: format!("Resume deferred task {}", thought.source_task_id),
                status: ScheduledTaskStatus::Pending,
                trigger: ScheduleTrigger::DeferUntil(defer_until),
                trigger_prompt: format!(
                    "The deferral window for task {} elapsed; reconsider: {}",
                    thought.source_task_id, params.reason
                ),
                origin_thought_id: Some(thought.thought_id.clone()),
                next_trigger_at: defer_until,
                deferral_count: 1,
            };
            ctx.scheduled.upsert_scheduled(&scheduled).map_err(ServiceError::from)?;
        }

        Ok(HandlerOutcome {
            thought_status: ThoughtStatus::Deferred,
            task_update: Some((TaskStatus::Deferred, None)),
            follow_up: None,
        })
    }
}
