// ciris-runtime/src/handlers/memory.rs
// ============================================================================
// Module: Memory Action Handlers
// Description: Memorize, recall, and forget handlers.
// Purpose: Mutate and query graph memory with identity-scope guarding.
// Dependencies: ciris-core, ciris-bus, crate::handlers
// ============================================================================

//! ## Overview
//! Memory actions go through the memory bus exclusively. Writes encapsulate
//! secret material before storage and recalls decapsulate it context-aware.
//! Identity-scope writes demand an authority signature; the variance guard
//! has already run in the pipeline, so a missing signature here is a
//! security violation, not a deferral.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use ciris_bus::BusError;
use ciris_bus::SecretsBus;
use ciris_core::ActionKind;
use ciris_core::ActionParams;
use ciris_core::GraphScope;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::Thought;
use ciris_core::ThoughtId;
use ciris_core::ThoughtType;
use serde_json::Value;
use serde_json::json;
use uuid::Uuid;

use crate::handlers::ActionHandler;
use crate::handlers::HandlerContext;
use crate::handlers::HandlerOutcome;
use crate::handlers::bus_error;

// ============================================================================
// SECTION: Identity Guard
// ============================================================================

/// Requires a non-empty authority signature for identity-scope mutations.
fn require_authority(
    scope: GraphScope,
    signature: Option<&String>,
    operation: &str,
) -> Result<(), ServiceError> {
    if scope != GraphScope::Identity {
        return Ok(());
    }
    match signature {
        Some(signature) if !signature.trim().is_empty() => Ok(()),
        _ => Err(ServiceError::security_violation(format!(
            "identity-scope {operation} requires an authority signature"
        ))),
    }
}

// ============================================================================
// SECTION: Secret Walking
// ============================================================================

/// Boxed future used by the recursive secret walkers.
type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send + 'a>>;

/// Encapsulates secret material in every string leaf of a JSON value.
///
/// A missing secrets provider passes content through unchanged.
fn encapsulate_strings<'a>(
    secrets: &'a SecretsBus,
    value: &'a mut Value,
    context: &'a str,
) -> WalkFuture<'a> {
    Box::pin(async move {
        match value {
            Value::String(text) => {
                match secrets.encapsulate(text, context).await {
                    Ok((encapsulated, _refs)) => *text = encapsulated,
                    Err(BusError::NoProvider { .. }) => {}
                    Err(error) => return Err(bus_error(error)),
                }
            }
            Value::Object(map) => {
                for child in map.values_mut() {
                    encapsulate_strings(secrets, child, context).await?;
                }
            }
            Value::Array(items) => {
                for child in items.iter_mut() {
                    encapsulate_strings(secrets, child, context).await?;
                }
            }
            _ => {}
        }
        Ok(())
    })
}

/// Decapsulates secret references in every string leaf of a JSON value.
fn decapsulate_strings<'a>(
    secrets: &'a SecretsBus,
    value: &'a mut Value,
    context: &'a str,
) -> WalkFuture<'a> {
    Box::pin(async move {
        match value {
            Value::String(text) => {
                match secrets.decapsulate(text, ActionKind::Recall, context).await {
                    Ok(restored) => *text = restored,
                    Err(BusError::NoProvider { .. }) => {}
                    Err(error) => return Err(bus_error(error)),
                }
            }
            Value::Object(map) => {
                for child in map.values_mut() {
                    decapsulate_strings(secrets, child, context).await?;
                }
            }
            Value::Array(items) => {
                for child in items.iter_mut() {
                    decapsulate_strings(secrets, child, context).await?;
                }
            }
            _ => {}
        }
        Ok(())
    })
}

// ============================================================================
// SECTION: Memorize Handler
// ============================================================================

/// Stores a node in graph memory with secrets encapsulation.
pub struct MemorizeHandler;

#[async_trait]
impl ActionHandler for MemorizeHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Memorize
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Memorize(params) = &action.params else {
            return Err(ServiceError::validation("memorize handler received non-memorize params"));
        };
        require_authority(params.node.scope, params.authority_signature.as_ref(), "write")?;

        let mut node = params.node.clone();
        encapsulate_strings(&ctx.buses.secrets, &mut node.attributes, "memorize").await?;
        ctx.buses.memory.put_node(&node).await.map_err(bus_error)?;

        let follow_up = thought.follow_up(
            ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
            ThoughtType::FollowUp,
            format!("Memorized node {} in scope {}; continue the task.", node.id, node.scope),
            thought.context.clone(),
            ctx.clock.now(),
        );
        Ok(HandlerOutcome::completed_with_follow_up(follow_up))
    }
}

// ============================================================================
// SECTION: Recall Handler
// ============================================================================

/// Retrieves a node from graph memory with context-aware decapsulation.
pub struct RecallHandler;

#[async_trait]
impl ActionHandler for RecallHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Recall
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Recall(params) = &action.params else {
            return Err(ServiceError::validation("recall handler received non-recall params"));
        };

        let node = ctx
            .buses
            .memory
            .get_node(params.scope, &params.node_id)
            .await
            .map_err(bus_error)?;

        let mut context = thought.context.clone();
        let (content, recalled) = match node {
            Some(mut node) => {
                decapsulate_strings(&ctx.buses.secrets, &mut node.attributes, "recall").await?;
                let recalled = json!({
                    "recalled": node,
                });
                (
                    format!("Recalled node {} from scope {}.", params.node_id, params.scope),
                    recalled,
                )
            }
            None => (
                format!("No node {} in scope {}.", params.node_id, params.scope),
                json!({
                    "recalled": null,
                }),
            ),
        };
        context.tool_results.push(recalled);

        let follow_up = thought.follow_up(
            ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
            ThoughtType::FollowUp,
            content,
            context,
            ctx.clock.now(),
        );
        Ok(HandlerOutcome::completed_with_follow_up(follow_up))
    }
}

// ============================================================================
// SECTION: Forget Handler
// ============================================================================

/// Removes a node from graph memory.
pub struct ForgetHandler;

#[async_trait]
impl ActionHandler for ForgetHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Forget
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<HandlerOutcome, ServiceError> {
        let ActionParams::Forget(params) = &action.params else {
            return Err(ServiceError::validation("forget handler received non-forget params"));
        };
        require_authority(params.scope, params.authority_signature.as_ref(), "removal")?;

        ctx.buses
            .memory
            .delete_node(params.scope, &params.node_id)
            .await
            .map_err(bus_error)?;

        let follow_up = thought.follow_up(
            ThoughtId::new(format!("thought-{}", Uuid::new_v4())),
            ThoughtType::FollowUp,
            format!("Forgot node {} in scope {}; continue the task.", params.node_id, params.scope),
            thought.context.clone(),
            ctx.clock.now(),
        );
        Ok(HandlerOutcome::completed_with_follow_up(follow_up))
    }
}
