// ciris-core/src/core/error.rs
// ============================================================================
// Module: CIRIS Error Taxonomy
// Description: Shared error classification for services, buses, and handlers.
// Purpose: Drive retry, circuit-breaker, and escalation policy from one place.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every failure that crosses a component boundary carries an [`ErrorClass`].
//! The class decides whether the bus retries, whether the registry trips a
//! circuit breaker, and whether the processor escalates to shutdown. Handlers
//! and services construct [`ServiceError`] values instead of raising ad-hoc
//! error strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Class
// ============================================================================

/// Classification of a service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Timeout, connection reset, file busy, or database lock. Retried.
    Transient,
    /// Denied or forbidden. Never retried; provider removed for this call.
    PermissionDenied,
    /// Absent entity. Never retried; surfaced to the caller.
    NotFound,
    /// Ill-typed parameters. Never retried; the thought is marked failed.
    Validation,
    /// The registry cannot satisfy a capability request.
    NoProvider,
    /// Integrity violation such as an audit chain break or storage corruption.
    Fatal,
    /// Signature verification failure or variance breach. Blocks the action.
    SecurityViolation,
}

impl ErrorClass {
    /// Returns true when the bus may retry a failure of this class.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true when a failure of this class trips the circuit breaker.
    ///
    /// Auth, validation, and not-found failures indicate a caller problem
    /// rather than provider ill health, so they never open the circuit.
    #[must_use]
    pub const fn trips_breaker(&self) -> bool {
        !matches!(self, Self::PermissionDenied | Self::NotFound | Self::Validation)
    }

    /// Returns true when the processor must escalate this failure.
    #[must_use]
    pub const fn escalates(&self) -> bool {
        matches!(self, Self::Fatal | Self::SecurityViolation)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::NoProvider => "no_provider",
            Self::Fatal => "fatal",
            Self::SecurityViolation => "security_violation",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Service Error
// ============================================================================

/// Classified failure returned by capability providers and buses.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{class}: {message}")]
pub struct ServiceError {
    /// Failure classification.
    pub class: ErrorClass,
    /// Human-readable failure description.
    pub message: String,
}

impl ServiceError {
    /// Creates a classified service error.
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Creates a transient error (retried per bus policy).
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    /// Creates a permission error (never retried).
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::PermissionDenied, message)
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, message)
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, message)
    }

    /// Creates a no-provider error naming the unsatisfied capability.
    #[must_use]
    pub fn no_provider(capability: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::NoProvider,
            format!("no provider for capability: {}", capability.into()),
        )
    }

    /// Creates a fatal integrity error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Fatal, message)
    }

    /// Creates a security violation error.
    #[must_use]
    pub fn security_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::SecurityViolation, message)
    }
}
