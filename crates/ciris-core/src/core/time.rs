// ciris-core/src/core/time.rs
// ============================================================================
// Module: CIRIS Time Model
// Description: Canonical timestamps and the injectable clock source.
// Purpose: Provide deterministic, replayable time values across CIRIS records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! CIRIS threads a [`Clock`] through every component that needs the current
//! time. No component reads wall-clock time directly; this keeps replays and
//! tests deterministic. [`Timestamp`] values are unix-epoch milliseconds with
//! total ordering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in CIRIS records and audit entries.
///
/// # Invariants
/// - Values originate from a [`Clock`]; components never read wall-clock time.
/// - Ordering is total; equality is exact to the millisecond.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix-epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix-epoch milliseconds.
    #[must_use]
    pub const fn unix_millis(&self) -> i64 {
        self.0
    }

    /// Returns a timestamp advanced by the given number of milliseconds.
    #[must_use]
    pub const fn saturating_add_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns the signed millisecond delta from `earlier` to this timestamp.
    #[must_use]
    pub const fn millis_since(&self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Sole origin of timestamps within the runtime.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
        Timestamp::from_unix_millis(millis)
    }
}

/// Manually driven clock for deterministic tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time in unix-epoch milliseconds.
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock starting at the given time.
    #[must_use]
    pub const fn starting_at(at: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(at.unix_millis()),
        }
    }

    /// Sets the current time.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.unix_millis(), Ordering::SeqCst);
    }

    /// Advances the current time by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}
