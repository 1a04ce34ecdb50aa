// ciris-runtime/src/shutdown.rs
// ============================================================================
// Module: Shutdown Intent
// Description: Shared graceful-shutdown signal.
// Purpose: Let handlers, operators, and the emergency path request shutdown.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! Shutdown is an intent, not an interruption: requesting it records a reason
//! and wakes the processor, which finishes or abandons in-flight work within
//! the grace window and transitions to the shutdown state. The first recorded
//! reason wins; later requests are ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tokio::sync::watch;

// ============================================================================
// SECTION: Shutdown Handle
// ============================================================================

/// Cloneable handle carrying the shutdown intent.
#[derive(Clone)]
pub struct ShutdownHandle {
    /// Intent channel; `Some(reason)` once requested.
    sender: watch::Sender<Option<String>>,
}

impl ShutdownHandle {
    /// Creates a handle with no intent recorded.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender,
        }
    }

    /// Records the shutdown intent; the first reason wins.
    pub fn request(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            tracing::warn!(%reason, "shutdown requested");
            *current = Some(reason.clone());
            true
        });
    }

    /// Returns the recorded reason, when shutdown was requested.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    /// Returns true once shutdown was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Subscribes for intent changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.sender.subscribe()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}
