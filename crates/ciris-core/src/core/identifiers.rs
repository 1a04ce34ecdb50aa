// ciris-core/src/core/identifiers.rs
// ============================================================================
// Module: CIRIS Identifiers
// Description: Canonical opaque identifiers for tasks, thoughts, and services.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! the CIRIS core. Identifiers are opaque and serialize as strings. Validation
//! is handled at ingress or runtime boundaries rather than within these simple
//! wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier newtype with the standard surface.
macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_id! {
    /// Task identifier for a unit of work originating outside the reasoning loop.
    TaskId
}

string_id! {
    /// Thought identifier for a unit of reasoning tied to a task.
    ThoughtId
}

string_id! {
    /// Correlation identifier linking records across service interactions.
    CorrelationId
}

string_id! {
    /// Channel identifier naming an adapter-side conversation surface.
    ChannelId
}

string_id! {
    /// Graph node identifier within a memory scope.
    NodeId
}

string_id! {
    /// Audit event identifier (UUID string form).
    EventId
}

string_id! {
    /// Scheduled task identifier for deferred or recurring work.
    ScheduledTaskId
}

string_id! {
    /// Provider handle issued by the service registry at registration time.
    ProviderHandle
}

string_id! {
    /// Signing key identifier recorded on audit entries.
    SigningKeyId
}

string_id! {
    /// Wise Authority identifier for deferral approvals and privileged changes.
    WaId
}
