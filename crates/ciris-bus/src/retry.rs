// ciris-bus/src/retry.rs
// ============================================================================
// Module: Bus Retry Policies
// Description: Operation-specific retry tables with jittered backoff.
// Purpose: Keep retry behavior in policy data, out of business code.
// Dependencies: ciris-core, rand
// ============================================================================

//! ## Overview
//! Each bus operation names a retry policy: how many attempts, the base
//! delay, the jitter fraction, and which error classes are retryable.
//! Business code never catches and retries; the bus core consults the policy
//! table. HTTP-like operations retry transient and timeout failures and never
//! retry auth, permission, or not-found; file-like operations additionally
//! tolerate brief lock contention with a shorter base delay.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use ciris_core::ErrorClass;
use rand::Rng;

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Retry policy for one bus operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound applied to the exponential backoff.
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]` applied to each delay.
    pub jitter: f64,
    /// Error classes eligible for retry under this policy.
    pub retryable: Vec<ErrorClass>,
}

impl RetryPolicy {
    /// Policy for network-backed operations (LLM, communication, tools).
    #[must_use]
    pub fn http_like() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter: 0.2,
            retryable: vec![ErrorClass::Transient],
        }
    }

    /// Policy for storage-backed operations (memory, audit).
    #[must_use]
    pub fn file_like() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: 0.1,
            retryable: vec![ErrorClass::Transient],
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
            retryable: Vec::new(),
        }
    }

    /// Returns true when a failure of `class` may be retried.
    #[must_use]
    pub fn retries(&self, class: ErrorClass) -> bool {
        self.retryable.contains(&class)
    }

    /// Computes the jittered backoff delay for a retry attempt (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        let capped = scaled.min(self.max_delay);
        if self.jitter <= 0.0 {
            return capped;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(0.0..self.jitter);
        capped.mul_f64(factor)
    }
}
