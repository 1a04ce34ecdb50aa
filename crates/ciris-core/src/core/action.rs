// ciris-core/src/core/action.rs
// ============================================================================
// Module: CIRIS Action Set
// Description: The closed ten-action set with typed parameters.
// Purpose: Represent every effect a thought can select, with no untyped maps.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! A thought resolves to exactly one action from a closed set of ten. Each
//! action carries typed parameters; untyped maps never cross the handler
//! boundary. Conversions from loose payloads happen at adapter edges only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::graph::GraphNode;
use crate::core::graph::GraphScope;
use crate::core::identifiers::ChannelId;
use crate::core::identifiers::NodeId;
use crate::core::task::TaskOutcome;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Action Kind
// ============================================================================

/// Discriminant of the closed action set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Deliver a message to a channel.
    Speak,
    /// Record an observation about the environment.
    Observe,
    /// Invoke a named external tool.
    Tool,
    /// Terminate the task as failed with a reason.
    Reject,
    /// Continue reasoning with a deeper follow-up thought.
    Ponder,
    /// Hand the task to a Wise Authority.
    Defer,
    /// Store a node in graph memory.
    Memorize,
    /// Retrieve a node from graph memory.
    Recall,
    /// Remove a node from graph memory.
    Forget,
    /// Terminate the task as completed with an outcome.
    TaskComplete,
}

impl ActionKind {
    /// Returns true for actions that end the thought chain.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Reject | Self::Defer | Self::TaskComplete)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Speak => "speak",
            Self::Observe => "observe",
            Self::Tool => "tool",
            Self::Reject => "reject",
            Self::Ponder => "ponder",
            Self::Defer => "defer",
            Self::Memorize => "memorize",
            Self::Recall => "recall",
            Self::Forget => "forget",
            Self::TaskComplete => "task_complete",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Action Parameters
// ============================================================================

/// Parameters for the speak action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakParams {
    /// Delivery channel.
    pub channel_id: ChannelId,
    /// Message content to deliver.
    pub content: String,
}

/// Parameters for the observe action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserveParams {
    /// Channel to observe, when channel-scoped.
    pub channel_id: Option<ChannelId>,
    /// What was observed.
    pub summary: String,
}

/// Parameters for the tool action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParams {
    /// Registered tool name.
    pub name: String,
    /// Tool arguments validated against the tool descriptor.
    pub arguments: Value,
}

/// Parameters for the reject action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectParams {
    /// Human-readable rejection reason.
    pub reason: String,
}

/// Parameters for the ponder action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PonderParams {
    /// Open questions the follow-up thought should address.
    pub questions: Vec<String>,
}

/// Parameters for the defer action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferParams {
    /// Reason the task is deferred.
    pub reason: String,
    /// Optional time after which the task should be retriggered.
    pub defer_until: Option<Timestamp>,
}

/// Parameters for the memorize action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorizeParams {
    /// Node to store.
    pub node: GraphNode,
    /// Authority signature required for identity-scope writes.
    pub authority_signature: Option<String>,
}

/// Parameters for the recall action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallParams {
    /// Node identifier to retrieve.
    pub node_id: NodeId,
    /// Memory scope to search.
    pub scope: GraphScope,
}

/// Parameters for the forget action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgetParams {
    /// Node identifier to remove.
    pub node_id: NodeId,
    /// Memory scope holding the node.
    pub scope: GraphScope,
    /// Authority signature required for identity-scope removals.
    pub authority_signature: Option<String>,
}

/// Parameters for the task-complete action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompleteParams {
    /// Structured task outcome.
    pub outcome: TaskOutcome,
}

/// Typed parameter payload, one variant per action kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum ActionParams {
    /// Speak parameters.
    Speak(SpeakParams),
    /// Observe parameters.
    Observe(ObserveParams),
    /// Tool parameters.
    Tool(ToolParams),
    /// Reject parameters.
    Reject(RejectParams),
    /// Ponder parameters.
    Ponder(PonderParams),
    /// Defer parameters.
    Defer(DeferParams),
    /// Memorize parameters.
    Memorize(MemorizeParams),
    /// Recall parameters.
    Recall(RecallParams),
    /// Forget parameters.
    Forget(ForgetParams),
    /// Task-complete parameters.
    TaskComplete(TaskCompleteParams),
}

impl ActionParams {
    /// Returns the action kind of this parameter payload.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Speak(_) => ActionKind::Speak,
            Self::Observe(_) => ActionKind::Observe,
            Self::Tool(_) => ActionKind::Tool,
            Self::Reject(_) => ActionKind::Reject,
            Self::Ponder(_) => ActionKind::Ponder,
            Self::Defer(_) => ActionKind::Defer,
            Self::Memorize(_) => ActionKind::Memorize,
            Self::Recall(_) => ActionKind::Recall,
            Self::Forget(_) => ActionKind::Forget,
            Self::TaskComplete(_) => ActionKind::TaskComplete,
        }
    }
}

// ============================================================================
// SECTION: Selected Action
// ============================================================================

/// Action chosen by the selection DMA, with its rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAction {
    /// Typed action parameters.
    pub params: ActionParams,
    /// Why this action was selected.
    pub rationale: String,
}

impl SelectedAction {
    /// Creates a selected action.
    #[must_use]
    pub fn new(params: ActionParams, rationale: impl Into<String>) -> Self {
        Self {
            params,
            rationale: rationale.into(),
        }
    }

    /// Returns the action kind.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.params.kind()
    }

    /// Forced task completion used by the depth guard.
    #[must_use]
    pub fn depth_cap_completion() -> Self {
        Self::new(
            ActionParams::TaskComplete(TaskCompleteParams {
                outcome: TaskOutcome {
                    status: "depth-cap".to_string(),
                    summary: "thought depth cap reached".to_string(),
                    structured_data: None,
                },
            }),
            "thought depth exceeded the configured cap".to_string(),
        )
    }

    /// Synthesized deferral used when evaluation cannot proceed.
    #[must_use]
    pub fn synthesized_defer(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ActionParams::Defer(DeferParams {
                reason: reason.clone(),
                defer_until: None,
            }),
            reason,
        )
    }
}
