// ciris-core/src/core/task.rs
// ============================================================================
// Module: CIRIS Task Model
// Description: Task records, status lifecycle, context, and outcomes.
// Purpose: Represent units of work originating outside the reasoning loop.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! A task is the unit of work the runtime accepts from adapters. Tasks are
//! immutable records; every mutation produces a new version identified by a
//! monotonic `updated_at`. Status transitions are validated by
//! [`TaskStatus::can_transition_to`] and a completed task always carries an
//! outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ChannelId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::SigningKeyId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Task Status
// ============================================================================

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted but not yet picked up by the processor.
    Pending,
    /// Currently driving thought generation.
    Active,
    /// Finished with a recorded outcome.
    Completed,
    /// Terminated without an outcome.
    Failed,
    /// Handed to a Wise Authority or scheduled for a later retrigger.
    Deferred,
}

impl TaskStatus {
    /// Returns true when the transition to `next` is legal.
    ///
    /// # Invariants
    /// - `Pending -> Active -> {Completed | Failed | Deferred}`.
    /// - `Deferred` may return to `Active`.
    /// - Terminal states (`Completed`, `Failed`) accept no transitions.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Active, Self::Completed | Self::Failed | Self::Deferred)
                | (Self::Deferred, Self::Active)
        )
    }

    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ============================================================================
// SECTION: Task Context
// ============================================================================

/// Origination context attached to a task at ingress.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// Channel the originating message arrived on.
    pub channel_id: Option<ChannelId>,
    /// Identifier of the message author or system originator.
    pub originator_id: Option<String>,
    /// Correlation identifier threading related records together.
    pub correlation_id: Option<CorrelationId>,
}

// ============================================================================
// SECTION: Task Outcome
// ============================================================================

/// Structured result recorded when a task completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Terminal status label (for example `completed` or `depth-cap`).
    pub status: String,
    /// Human-readable summary of what was accomplished.
    pub summary: String,
    /// Optional structured payload describing the result.
    pub structured_data: Option<Value>,
}

impl TaskOutcome {
    /// Builds a plain completion outcome from a summary.
    #[must_use]
    pub fn completed(summary: impl Into<String>) -> Self {
        Self {
            status: "completed".to_string(),
            summary: summary.into(),
            structured_data: None,
        }
    }
}

// ============================================================================
// SECTION: Task Signature
// ============================================================================

/// Accountability signature recorded on a completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignature {
    /// Signer identifier (signing key id).
    pub signed_by: SigningKeyId,
    /// Base64-encoded signature over the canonical task form.
    pub signature: String,
    /// Time the signature was produced.
    pub signed_at: Timestamp,
}

// ============================================================================
// SECTION: Task Record
// ============================================================================

/// Unit of work originating outside the reasoning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique identifier.
    pub task_id: TaskId,
    /// What the task asks the agent to do.
    pub description: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Scheduling priority; larger values are processed first.
    pub priority: i32,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the most recent mutation.
    pub updated_at: Timestamp,
    /// Optional parent task for decomposed work.
    pub parent_task_id: Option<TaskId>,
    /// Origination context.
    pub context: TaskContext,
    /// Structured result; non-null exactly when the task is completed.
    pub outcome: Option<TaskOutcome>,
    /// Optional accountability signature.
    pub signature: Option<TaskSignature>,
}

impl Task {
    /// Creates a new pending task.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        description: impl Into<String>,
        priority: i32,
        context: TaskContext,
        created_at: Timestamp,
    ) -> Self {
        Self {
            task_id,
            description: description.into(),
            status: TaskStatus::Pending,
            priority,
            created_at,
            updated_at: created_at,
            parent_task_id: None,
            context,
            outcome: None,
            signature: None,
        }
    }

    /// Canonical form covered by task signing.
    ///
    /// The signature covers identity, description, outcome, and completion
    /// time, excluding the signature field itself.
    #[must_use]
    pub fn signable_form(&self) -> Value {
        serde_json::json!({
            "task_id": self.task_id,
            "description": self.description,
            "status": self.status,
            "outcome": self.outcome,
            "updated_at": self.updated_at,
        })
    }
}
