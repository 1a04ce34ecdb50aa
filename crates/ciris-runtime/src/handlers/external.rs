// ciris-runtime/src/handlers/external.rs
// ============================================================================
// Module: External Action Handlers
// Description: Speak, observe, and tool handlers.
// Purpose: Perform the actions with effects outside the reasoning loop.
// Dependencies: ciris-core, ciris-bus, crate::handlers
// ============================================================================

//! ## Overview
//! External actions touch the world: speak delivers to a channel, observe
//! reads one, tool invokes a named capability. Each creates a follow-up
//! thought so the reasoning chain can confirm or react to the effect. A
//! speak delivery failure is critical: with no provider able to reach the
//! user, the handler requests graceful shutdown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use ciris_bus::BusError;
use ciris_core::ActionKind;
use ciris_core::ActionParams;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::Thought;
use ciris_core::ThoughtType;
use ciris_core::ThoughtId;
use serde_json::json;
use uuid::Uuid;

use crate::handlers::ActionHandler;
use crate::handlers::HandlerContext;
use crate::handlers::HandlerOutcome;
use crate::handlers::bus_error;

// ============================================================================
// SECTION: Speak Handler
// ============================================================================

/// Delivers a message to a channel through the communication bus.
pub struct SpeakHandler;

#[async_trait]
impl ActionHandler for SpeakHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Speak
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Speak(params) = &action.params else {
            return Err(ServiceError::validation("speak handler received non-speak params"));
        };

        // Outbound content passes the filter when one is registered.
        match ctx.buses.filter.check(&params.content, "outbound").await {
            Ok(verdict) if !verdict.allowed => {
                return Err(ServiceError::validation(format!(
                    "outbound content blocked by filter: {}",
                    verdict.reason.unwrap_or_default()
                )));
            }
            Ok(_) | Err(BusError::NoProvider { .. }) => {}
            Err(error) => return Err(bus_error(error)),
        }

        let delivered = ctx
            .buses
            .communication
            .send_message(&params.channel_id, &params.content)
            .await
            .map_err(bus_error);

        match delivered {
            Ok(true) => {
                let follow_up = thought.follow_up(
                    ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
                    ThoughtType::FollowUp,
                    format!(
                        "Reply delivered to channel {}; confirm whether the task is complete.",
                        params.channel_id
                    ),
                    thought.context.clone(),
                    ctx.clock.now(),
                );
                Ok(HandlerOutcome::completed_with_follow_up(follow_up))
            }
            Ok(false) => Err(ServiceError::fatal(format!(
                "communication provider declined delivery to channel {}",
                params.channel_id
            ))),
            Err(error) => Err(ServiceError::fatal(format!(
                "no provider could deliver to channel {}: {error}",
                params.channel_id
            ))),
        }
    }
}

// ============================================================================
// SECTION: Observe Handler
// ============================================================================

/// Messages fetched per observation.
const OBSERVE_FETCH_LIMIT: usize = 10;

/// Records an observation, optionally reading a channel's recent messages.
pub struct ObserveHandler;

#[async_trait]
impl ActionHandler for ObserveHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Observe
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Observe(params) = &action.params else {
            return Err(ServiceError::validation("observe handler received non-observe params"));
        };

        let mut context = thought.context.clone();
        if let Some(channel_id) = &params.channel_id {
            match ctx.buses.communication.fetch_messages(channel_id, OBSERVE_FETCH_LIMIT).await {
                Ok(messages) => {
                    context.tool_results.push(json!({
                        "observation": params.summary,
                        "channel_id": channel_id,
                        "messages": messages,
                    }));
                }
                Err(error) => {
                    tracing::warn!(%channel_id, %error, "observation fetch failed");
                }
            }
        }

        let follow_up = thought.follow_up(
            ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
            ThoughtType::Observation,
            format!("Observed: {}", params.summary),
            context,
            ctx.clock.now(),
        );
        Ok(HandlerOutcome::completed_with_follow_up(follow_up))
    }
}

// ============================================================================
// SECTION: Tool Handler
// ============================================================================

/// Invokes a named tool through the tool bus.
pub struct ToolHandler;

#[async_trait]
impl ActionHandler for ToolHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Tool
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Tool(params) = &action.params else {
            return Err(ServiceError::validation("tool handler received non-tool params"));
        };
        if !params.arguments.is_object() {
            return Err(ServiceError::validation("tool arguments must be a JSON object"));
        }

        let result = ctx
            .buses
            .tool
            .execute_tool(&params.name, &params.arguments)
            .await
            .map_err(bus_error)?;

        let mut context = thought.context.clone();
        context.tool_results.push(json!({
            "tool": params.name,
            "success": result.success,
            "output": result.output,
            "error": result.error,
        }));

        let follow_up = thought.follow_up(
            ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
            ThoughtType::FollowUp,
            format!(
                "Tool {} {}; evaluate the result and continue the task.",
                params.name,
                if result.success { "succeeded" } else { "failed" }
            ),
            context,
            ctx.clock.now(),
        );
        Ok(HandlerOutcome::completed_with_follow_up(follow_up))
    }
}
