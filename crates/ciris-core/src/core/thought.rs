// ciris-core/src/core/thought.rs
// ============================================================================
// Module: CIRIS Thought Model
// Description: Thought records, lifecycle, and reasoning context.
// Purpose: Represent units of reasoning tied to tasks with bounded depth.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! A thought is one unit of reasoning tied to a task. Thoughts form chains via
//! `parent_thought_id`; depth from the seed is tracked in `round_number` and
//! capped by the pipeline depth guard. Thought chains are stored as id
//! references, never as in-memory graph pointers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::action::SelectedAction;
use crate::core::identifiers::ChannelId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::TaskId;
use crate::core::identifiers::ThoughtId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default cap on follow-up depth from the seed thought.
pub const DEFAULT_MAX_THOUGHT_DEPTH: u32 = 7;

// ============================================================================
// SECTION: Thought Status
// ============================================================================

/// Lifecycle status of a thought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtStatus {
    /// Queued for a processing round.
    Pending,
    /// Picked up by the current round.
    Processing,
    /// Evaluated and dispatched.
    Completed,
    /// Evaluation or dispatch failed.
    Failed,
    /// Deferred to a Wise Authority.
    Deferred,
}

impl ThoughtStatus {
    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Deferred)
    }
}

// ============================================================================
// SECTION: Thought Type
// ============================================================================

/// Kind of reasoning a thought performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    /// Ordinary reasoning seeded from a task or ponder.
    Standard,
    /// Continuation created by a non-terminal handler.
    FollowUp,
    /// Offline consolidation produced in the dream state.
    Reflection,
    /// Observation recorded from the environment.
    Observation,
}

// ============================================================================
// SECTION: Epistemic Data
// ============================================================================

/// Insight produced by a conscience faculty during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpistemicInsight {
    /// Faculty that produced the insight.
    pub faculty: String,
    /// Faculty score in `[0, 1]`.
    pub score: f64,
    /// Human-readable insight text.
    pub insight: String,
}

// ============================================================================
// SECTION: Thought Context
// ============================================================================

/// Reasoning context carried by a thought and inherited by its children.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThoughtContext {
    /// Channel the originating message arrived on.
    pub channel_id: Option<ChannelId>,
    /// Identifier of the message author or system originator.
    pub originator_id: Option<String>,
    /// Correlation identifier threading related records together.
    pub correlation_id: Option<CorrelationId>,
    /// Epistemic insights accumulated by conscience evaluations.
    pub epistemic_data: Vec<EpistemicInsight>,
    /// Reason the previous action selection was overridden, if any.
    pub override_reason: Option<String>,
    /// Structured results from prior tool invocations.
    pub tool_results: Vec<Value>,
}

// ============================================================================
// SECTION: Thought Record
// ============================================================================

/// Unit of reasoning tied to a task.
///
/// # Invariants
/// - `round_number` never exceeds the configured depth cap.
/// - Every non-seed thought names a parent via `parent_thought_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    /// Opaque unique identifier.
    pub thought_id: ThoughtId,
    /// Task this thought reasons about.
    pub source_task_id: TaskId,
    /// Reasoning kind.
    pub thought_type: ThoughtType,
    /// Lifecycle status.
    pub status: ThoughtStatus,
    /// Depth from the seed thought.
    pub round_number: u32,
    /// Textual content under evaluation.
    pub content: String,
    /// Reasoning context inherited by children.
    pub context: ThoughtContext,
    /// Number of ponder actions taken along this chain.
    pub ponder_count: u32,
    /// Parent thought; `None` exactly for the seed.
    pub parent_thought_id: Option<ThoughtId>,
    /// Action ultimately selected for this thought.
    pub final_action: Option<SelectedAction>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the most recent mutation.
    pub updated_at: Timestamp,
}

impl Thought {
    /// Creates the seed thought for a task.
    #[must_use]
    pub fn seed(
        thought_id: ThoughtId,
        task_id: TaskId,
        content: impl Into<String>,
        context: ThoughtContext,
        created_at: Timestamp,
    ) -> Self {
        Self {
            thought_id,
            source_task_id: task_id,
            thought_type: ThoughtType::Standard,
            status: ThoughtStatus::Pending,
            round_number: 0,
            content: content.into(),
            context,
            ponder_count: 0,
            parent_thought_id: None,
            final_action: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Creates a follow-up thought one round deeper than this one.
    #[must_use]
    pub fn follow_up(
        &self,
        thought_id: ThoughtId,
        thought_type: ThoughtType,
        content: impl Into<String>,
        context: ThoughtContext,
        created_at: Timestamp,
    ) -> Self {
        Self {
            thought_id,
            source_task_id: self.source_task_id.clone(),
            thought_type,
            status: ThoughtStatus::Pending,
            round_number: self.round_number + 1,
            content: content.into(),
            context,
            ponder_count: self.ponder_count,
            parent_thought_id: Some(self.thought_id.clone()),
            final_action: None,
            created_at,
            updated_at: created_at,
        }
    }
}
