// ciris-core/src/core/audit.rs
// ============================================================================
// Module: CIRIS Audit Model
// Description: Audit event inputs and tamper-evident chain entries.
// Purpose: Define the canonical hashed-and-signed audit record shape.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Every executed action, lifecycle transition, and security decision produces
//! exactly one audit event. The chain crate turns events into [`AuditEntry`]
//! records whose hashes and signatures are verifiable offline. The canonical
//! hashed form is fixed here: changing field names or ordering semantics
//! invalidates existing chains.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::action::ActionKind;
use crate::core::identifiers::EventId;
use crate::core::identifiers::SigningKeyId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sentinel `previous_hash` value of the genesis entry.
pub const GENESIS_PREVIOUS_HASH: &str = "genesis";

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Kind of event recorded in the audit chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A task was created at ingress.
    TaskCreated,
    /// A thought was created.
    ThoughtCreated,
    /// A DMA pipeline evaluation finished.
    DmaCompleted,
    /// The conscience overrode an action selection.
    ConscienceOverridden,
    /// A speak action executed.
    ActionSpeak,
    /// An observe action executed.
    ActionObserve,
    /// A tool action executed.
    ActionTool,
    /// A reject action executed.
    ActionReject,
    /// A ponder action executed.
    ActionPonder,
    /// A defer action executed.
    ActionDefer,
    /// A memorize action executed.
    ActionMemorize,
    /// A recall action executed.
    ActionRecall,
    /// A forget action executed.
    ActionForget,
    /// A task-complete action executed.
    ActionTaskComplete,
    /// The processor changed cognitive state.
    StateTransition,
    /// An emergency command was accepted.
    EmergencyCommandAccepted,
    /// An emergency command was rejected.
    EmergencyCommandRejected,
    /// A security violation was blocked.
    SecurityViolation,
    /// A fatal integrity failure was observed.
    FatalError,
    /// A component requested graceful shutdown.
    ShutdownRequested,
}

impl AuditEventType {
    /// Returns the audit event type recording an executed action.
    #[must_use]
    pub const fn for_action(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Speak => Self::ActionSpeak,
            ActionKind::Observe => Self::ActionObserve,
            ActionKind::Tool => Self::ActionTool,
            ActionKind::Reject => Self::ActionReject,
            ActionKind::Ponder => Self::ActionPonder,
            ActionKind::Defer => Self::ActionDefer,
            ActionKind::Memorize => Self::ActionMemorize,
            ActionKind::Recall => Self::ActionRecall,
            ActionKind::Forget => Self::ActionForget,
            ActionKind::TaskComplete => Self::ActionTaskComplete,
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TaskCreated => "task_created",
            Self::ThoughtCreated => "thought_created",
            Self::DmaCompleted => "dma_completed",
            Self::ConscienceOverridden => "conscience_overridden",
            Self::ActionSpeak => "action_speak",
            Self::ActionObserve => "action_observe",
            Self::ActionTool => "action_tool",
            Self::ActionReject => "action_reject",
            Self::ActionPonder => "action_ponder",
            Self::ActionDefer => "action_defer",
            Self::ActionMemorize => "action_memorize",
            Self::ActionRecall => "action_recall",
            Self::ActionForget => "action_forget",
            Self::ActionTaskComplete => "action_task_complete",
            Self::StateTransition => "state_transition",
            Self::EmergencyCommandAccepted => "emergency_command_accepted",
            Self::EmergencyCommandRejected => "emergency_command_rejected",
            Self::SecurityViolation => "security_violation",
            Self::FatalError => "fatal_error",
            Self::ShutdownRequested => "shutdown_requested",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Audit Event
// ============================================================================

/// Event submitted to the audit chain before hashing and signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event kind.
    pub event_type: AuditEventType,
    /// Component or entity that originated the event.
    pub originator_id: String,
    /// Structured event payload.
    pub payload: Value,
}

impl AuditEvent {
    /// Creates an audit event.
    #[must_use]
    pub fn new(event_type: AuditEventType, originator_id: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type,
            originator_id: originator_id.into(),
            payload,
        }
    }
}

// ============================================================================
// SECTION: Audit Entry
// ============================================================================

/// Canonical hashed form of an audit entry.
///
/// # Invariants
/// - Field set and names are fixed; the entry hash is SHA-256 over the
///   RFC 8785 canonicalization of exactly this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntryHashForm {
    /// Event identifier.
    pub event_id: EventId,
    /// Event time.
    pub event_timestamp: Timestamp,
    /// Event kind.
    pub event_type: AuditEventType,
    /// Originating component or entity.
    pub originator_id: String,
    /// Structured event payload.
    pub event_payload: Value,
    /// Position in the chain.
    pub sequence_number: u64,
    /// Hash of the preceding entry, or the genesis sentinel.
    pub previous_hash: String,
}

/// Tamper-evident entry in the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain; strictly monotonic and gap-free.
    pub sequence_number: u64,
    /// Event identifier.
    pub event_id: EventId,
    /// Event time.
    pub event_timestamp: Timestamp,
    /// Event kind.
    pub event_type: AuditEventType,
    /// Originating component or entity.
    pub originator_id: String,
    /// Structured event payload.
    pub event_payload: Value,
    /// Hash of the preceding entry, or the genesis sentinel.
    pub previous_hash: String,
    /// Lowercase hex SHA-256 over the canonical hash form.
    pub entry_hash: String,
    /// Base64-encoded signature over the entry hash.
    pub signature: String,
    /// Key that produced the signature.
    pub signing_key_id: SigningKeyId,
}

impl AuditEntry {
    /// Returns the canonical form covered by the entry hash.
    #[must_use]
    pub fn hash_form(&self) -> AuditEntryHashForm {
        AuditEntryHashForm {
            event_id: self.event_id.clone(),
            event_timestamp: self.event_timestamp,
            event_type: self.event_type,
            originator_id: self.originator_id.clone(),
            event_payload: self.event_payload.clone(),
            sequence_number: self.sequence_number,
            previous_hash: self.previous_hash.clone(),
        }
    }
}
