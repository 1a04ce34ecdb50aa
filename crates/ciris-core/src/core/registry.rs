// ciris-core/src/core/registry.rs
// ============================================================================
// Module: CIRIS Service Directory Model
// Description: Service categories, priorities, health, and circuit states.
// Purpose: Shared vocabulary between the registry, buses, and telemetry.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! These types describe entries in the service registry. The registry crate
//! owns the selection and breaker behavior; this module owns the record shapes
//! so buses and telemetry can speak about registrations without depending on
//! the registry implementation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ProviderHandle;

// ============================================================================
// SECTION: Service Type
// ============================================================================

/// Service category, one per bus kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Message delivery and retrieval.
    Communication,
    /// Graph memory storage.
    Memory,
    /// External tool execution.
    Tool,
    /// Deferral approval and guidance.
    WiseAuthority,
    /// Structured language-model generation.
    Llm,
    /// Content filtering.
    Filter,
    /// Audit event logging.
    Audit,
    /// Metric recording.
    Telemetry,
    /// Operator runtime control.
    RuntimeControl,
    /// Secret encapsulation and decapsulation.
    Secrets,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Communication => "communication",
            Self::Memory => "memory",
            Self::Tool => "tool",
            Self::WiseAuthority => "wise_authority",
            Self::Llm => "llm",
            Self::Filter => "filter",
            Self::Audit => "audit",
            Self::Telemetry => "telemetry",
            Self::RuntimeControl => "runtime_control",
            Self::Secrets => "secrets",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Priority, Health, Circuit State
// ============================================================================

/// Provider selection priority; higher variants are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Lowest preference.
    Low,
    /// Default preference.
    Normal,
    /// Preferred over normal providers.
    High,
    /// Always preferred when healthy.
    Critical,
}

/// Reported provider health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Provider is serving requests.
    Up,
    /// Provider is not serving requests.
    Down,
    /// Provider is serving requests with elevated failures.
    Degraded,
}

/// Circuit breaker state for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are shed until the reset timeout elapses.
    Open,
    /// One probe request decides between closed and open.
    HalfOpen,
}

// ============================================================================
// SECTION: Registration Record
// ============================================================================

/// Directory entry describing a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Handle issued at registration time.
    pub handle: ProviderHandle,
    /// Service category the provider serves.
    pub service_type: ServiceType,
    /// Capabilities the provider advertises.
    pub capabilities: BTreeSet<String>,
    /// Selection priority.
    pub priority: Priority,
    /// Reported health.
    pub health: Health,
    /// Current circuit breaker state.
    pub circuit_state: CircuitState,
}
