// ciris-runtime/src/ingress.rs
// ============================================================================
// Module: Message Ingress
// Description: The single adapter-to-core entry point.
// Purpose: Turn incoming messages into pending tasks with audit records.
// Dependencies: ciris-core, ciris-audit
// ============================================================================

//! ## Overview
//! Adapters call one function: submit a typed message, receive a task id.
//! The ingress creates a pending task carrying the message context; the
//! processor activates it and seeds the initial thought in its next round.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use ciris_audit::AuditChain;
use ciris_core::AuditEvent;
use ciris_core::AuditEventType;
use ciris_core::ChannelId;
use ciris_core::Clock;
use ciris_core::CorrelationId;
use ciris_core::IncomingMessage;
use ciris_core::Task;
use ciris_core::TaskContext;
use ciris_core::TaskId;
use ciris_core::TaskStore;
use ciris_core::interfaces::StoreError;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ingress errors.
#[derive(Debug, Error)]
pub enum IngressError {
    /// Message failed validation.
    #[error("invalid message: {0}")]
    Invalid(String),
    /// Task persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Ingress
// ============================================================================

/// Default priority for adapter-submitted tasks.
const DEFAULT_INGRESS_PRIORITY: i32 = 0;

/// The adapter-to-core ingress.
pub struct Ingress {
    /// Task persistence.
    tasks: Arc<dyn TaskStore>,
    /// Audit chain for task-created events.
    audit: Arc<AuditChain>,
    /// Clock for creation timestamps.
    clock: Arc<dyn Clock>,
}

impl Ingress {
    /// Creates the ingress.
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskStore>, audit: Arc<AuditChain>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks,
            audit,
            clock,
        }
    }

    /// Submits a message, creating a pending task.
    ///
    /// # Errors
    ///
    /// Returns [`IngressError`] when the message is empty or persistence
    /// fails.
    pub fn submit_message(&self, message: &IncomingMessage) -> Result<TaskId, IngressError> {
        if message.content.trim().is_empty() {
            return Err(IngressError::Invalid("message content is empty".to_string()));
        }
        if message.channel_id.as_str().is_empty() {
            return Err(IngressError::Invalid("channel id is empty".to_string()));
        }

        let now = self.clock.now();
        let task_id = TaskId::new(format!("task-{}", Uuid::new_v4()));
        let correlation_id = message
            .correlation_id
            .clone()
            .unwrap_or_else(|| CorrelationId::new(Uuid::new_v4().to_string()));
        let task = Task::new(
            task_id.clone(),
            format!("Respond to {}: {}", message.author_name, message.content),
            DEFAULT_INGRESS_PRIORITY,
            TaskContext {
                channel_id: Some(ChannelId::new(message.channel_id.as_str())),
                originator_id: Some(message.author_id.clone()),
                correlation_id: Some(correlation_id),
            },
            now,
        );
        self.tasks.add_task(&task)?;

        let event = AuditEvent::new(AuditEventType::TaskCreated, "ingress", json!({
            "task_id": task_id,
            "channel_id": message.channel_id,
            "author_id": message.author_id,
        }));
        if let Err(error) = self.audit.append(&event) {
            tracing::error!(%error, "audit append failed for task creation");
        }

        tracing::info!(%task_id, channel = %message.channel_id, "message accepted");
        Ok(task_id)
    }
}
