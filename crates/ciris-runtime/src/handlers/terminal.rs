// ciris-runtime/src/handlers/terminal.rs
// ============================================================================
// Module: Terminal Action Handler
// Description: Task-complete handler with accountability signing.
// Purpose: Close the task with an outcome and a verifiable signature.
// Dependencies: ciris-core, ciris-audit, crate::handlers
// ============================================================================

//! ## Overview
//! Task completion is the only terminal action with a recorded outcome. The
//! handler transitions the task, then signs its canonical completed form with
//! the audit chain's active key so downstream consumers can hold the runtime
//! accountable for what it claims to have done.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use ciris_core::ActionKind;
use ciris_core::ActionParams;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::TaskStatus;
use ciris_core::Thought;
use ciris_core::ThoughtStatus;

use crate::handlers::ActionHandler;
use crate::handlers::HandlerContext;
use crate::handlers::HandlerOutcome;

// ============================================================================
// SECTION: Task Complete Handler
// ============================================================================

/// Completes the task, records its outcome, and signs it.
pub struct TaskCompleteHandler;

#[async_trait]
impl ActionHandler for TaskCompleteHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::TaskComplete
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::TaskComplete(params) = &action.params else {
            return Err(ServiceError::validation(
                "task-complete handler received non-completion params",
            ));
        };

        let now = ctx.clock.now();
        ctx.tasks
            .update_task_status(
                &thought.source_task_id,
                TaskStatus::Completed,
                Some(&params.outcome),
                now,
            )
            .map_err(ServiceError::from)?;

        let completed = ctx
            .tasks
            .get_task(&thought.source_task_id)
            .map_err(ServiceError::from)?
            .ok_or_else(|| {
                ServiceError::not_found(format!("task {} vanished", thought.source_task_id))
            })?;
        let (signature, signer_id) =
            ctx.audit.sign_task(&completed).map_err(ServiceError::from)?;
        ctx.tasks
            .sign_task(&thought.source_task_id, signer_id.as_str(), &signature, now)
            .map_err(ServiceError::from)?;

        Ok(HandlerOutcome {
            thought_status: ThoughtStatus::Completed,
            task_update: None,
            follow_up: None,
        })
    }
}
