// ciris-registry/src/circuit.rs
// ============================================================================
// Module: Provider Circuit Breaker
// Description: Per-provider failure tracking with clock-driven recovery.
// Purpose: Shed load from failing providers without hiding them forever.
// Dependencies: ciris-core
// ============================================================================

//! ## Overview
//! Each registered provider carries one circuit breaker. Consecutive
//! breaker-tripping failures open the circuit; after the reset timeout the
//! breaker half-opens and a single probe decides between closing and
//! re-opening. All timing flows through injected timestamps, never the wall
//! clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ciris_core::CircuitState;
use ciris_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// Default reset timeout in seconds before an open circuit half-opens.
pub const DEFAULT_RESET_TIMEOUT_SECONDS: i64 = 300;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Milliseconds an open circuit waits before half-opening.
    pub reset_timeout_millis: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_millis: DEFAULT_RESET_TIMEOUT_SECONDS * 1_000,
        }
    }
}

// ============================================================================
// SECTION: Circuit Breaker
// ============================================================================

/// Failure-tracking state machine for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreaker {
    /// Breaker configuration.
    config: BreakerConfig,
    /// Stored state; open circuits half-open lazily via [`Self::effective_state`].
    state: CircuitState,
    /// Consecutive breaker-tripping failures observed while closed.
    consecutive_failures: u32,
    /// Time the circuit last opened.
    opened_at: Option<Timestamp>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub const fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Returns the state as observed at `now`.
    ///
    /// An open circuit whose reset timeout has elapsed reports half-open
    /// without mutating stored state; the next recorded outcome resolves it.
    #[must_use]
    pub fn effective_state(&self, now: Timestamp) -> CircuitState {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if now.millis_since(opened_at) >= self.config.reset_timeout_millis =>
            {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Records a successful call observed at `now`.
    pub fn record_success(&mut self, now: Timestamp) {
        match self.effective_state(now) {
            CircuitState::HalfOpen | CircuitState::Open => {
                self.state = CircuitState::Closed;
                self.opened_at = None;
            }
            CircuitState::Closed => {}
        }
        self.consecutive_failures = 0;
    }

    /// Records a breaker-tripping failure observed at `now`.
    pub fn record_failure(&mut self, now: Timestamp) {
        match self.effective_state(now) {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Forces the breaker closed (operator circuit reset).
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }
}
