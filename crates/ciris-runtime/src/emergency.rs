// ciris-runtime/src/emergency.rs
// ============================================================================
// Module: Emergency Shutdown
// Description: Signed SHUTDOWN_NOW command entry point.
// Purpose: Let an allow-listed Wise Authority stop the runtime immediately.
// Dependencies: ciris-core, ciris-audit
// ============================================================================

//! ## Overview
//! A single entry point accepts signed emergency commands. Verification fails
//! closed; rejected commands record a security-violation audit entry and
//! cause no state transition. Accepted commands record a receipt and raise
//! the shutdown intent, which the processor honors within its grace window.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use ciris_audit::AuditChain;
use ciris_audit::CommandRejection;
use ciris_audit::EmergencyCommand;
use ciris_audit::verify_emergency_command;
use ciris_core::AuditEvent;
use ciris_core::AuditEventType;
use ciris_core::Clock;
use serde_json::json;

use crate::shutdown::ShutdownHandle;

// ============================================================================
// SECTION: Emergency Entry Point
// ============================================================================

/// The emergency shutdown entry point.
pub struct EmergencyShutdown {
    /// Audit chain for receipts and violations.
    audit: Arc<AuditChain>,
    /// Allow-listed Wise Authority public keys (base64).
    allowed_keys: Vec<String>,
    /// Clock anchoring the validity window.
    clock: Arc<dyn Clock>,
    /// Shutdown intent raised on acceptance.
    shutdown: ShutdownHandle,
}

impl EmergencyShutdown {
    /// Creates the entry point.
    #[must_use]
    pub fn new(
        audit: Arc<AuditChain>,
        allowed_keys: Vec<String>,
        clock: Arc<dyn Clock>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            audit,
            allowed_keys,
            clock,
            shutdown,
        }
    }

    /// Handles a signed emergency command.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandRejection`] after recording it; no shutdown
    /// occurs on rejection.
    pub fn handle_command(&self, command: &EmergencyCommand) -> Result<(), CommandRejection> {
        match verify_emergency_command(command, &self.allowed_keys, self.clock.now()) {
            Ok(()) => {
                self.append(AuditEventType::EmergencyCommandAccepted, json!({
                    "command_id": command.command_id,
                    "wa_id": command.wa_id,
                    "reason": command.reason,
                }));
                self.shutdown
                    .request(format!("emergency shutdown by {}: {}", command.wa_id, command.reason));
                Ok(())
            }
            Err(rejection) => {
                tracing::warn!(command_id = %command.command_id, %rejection, "command rejected");
                self.append(AuditEventType::EmergencyCommandRejected, json!({
                    "command_id": command.command_id,
                    "wa_id": command.wa_id,
                    "rejection": rejection.to_string(),
                }));
                self.append(AuditEventType::SecurityViolation, json!({
                    "command_id": command.command_id,
                    "violation": rejection.to_string(),
                }));
                Err(rejection)
            }
        }
    }

    /// Records an audit event for the command path.
    fn append(&self, event_type: AuditEventType, payload: serde_json::Value) {
        let event = AuditEvent::new(event_type, "emergency", payload);
        if let Err(error) = self.audit.append(&event) {
            tracing::error!(%error, "audit append failed for emergency command");
        }
    }
}
