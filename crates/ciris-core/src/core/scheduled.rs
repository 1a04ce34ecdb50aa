// ciris-core/src/core/scheduled.rs
// ============================================================================
// Module: CIRIS Scheduled Task Model
// Description: Deferred and recurring work records.
// Purpose: Represent future work the processor turns into tasks when due.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Scheduled tasks carry either a one-shot `defer_until` time or a recurring
//! cron expression. The processor evaluates due entries at the top of each
//! round and in solitude, creating ordinary tasks from their trigger prompts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ScheduledTaskId;
use crate::core::identifiers::ThoughtId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status and Trigger
// ============================================================================

/// Lifecycle status of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledTaskStatus {
    /// Waiting for its trigger time.
    Pending,
    /// Triggered at least once and still live (recurring).
    Active,
    /// One-shot entry that has fired.
    Complete,
    /// Entry that could not be triggered.
    Failed,
}

/// When a scheduled task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTrigger {
    /// One-shot trigger at or after the given time.
    DeferUntil(Timestamp),
    /// Recurring trigger described by a cron expression.
    Cron(String),
}

// ============================================================================
// SECTION: Scheduled Task Record
// ============================================================================

/// Deferred or recurring work the processor turns into tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Opaque unique identifier.
    pub id: ScheduledTaskId,
    /// Goal the future task should pursue.
    pub goal_description: String,
    /// Lifecycle status.
    pub status: ScheduledTaskStatus,
    /// One-shot or recurring trigger.
    pub trigger: ScheduleTrigger,
    /// Prompt seeding the created task.
    pub trigger_prompt: String,
    /// Thought that scheduled this work, if any.
    pub origin_thought_id: Option<ThoughtId>,
    /// Next time the entry is due.
    pub next_trigger_at: Timestamp,
    /// Number of times the entry has been deferred further.
    pub deferral_count: u32,
}

impl ScheduledTask {
    /// Returns true when the entry is due at `now` within `lookahead_millis`.
    #[must_use]
    pub const fn is_due(&self, now: Timestamp, lookahead_millis: i64) -> bool {
        matches!(self.status, ScheduledTaskStatus::Pending | ScheduledTaskStatus::Active)
            && self.next_trigger_at.unix_millis()
                <= now.unix_millis().saturating_add(lookahead_millis)
    }
}
