// ciris-core/src/core/correlation.rs
// ============================================================================
// Module: CIRIS Correlation Model
// Description: Service interaction records doubling as time-series rows.
// Purpose: Record service calls, metrics, and log lines with retention tags.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Correlations record every service interaction the buses perform, and the
//! same row shape carries metric datapoints and log entries. Rows are
//! timestamp-ordered per correlation chain and pruned per retention policy
//! during solitude rounds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CorrelationId;
use crate::core::registry::ServiceType;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Correlation Kinds
// ============================================================================

/// Kind of record a correlation row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationType {
    /// A service interaction performed through a bus.
    ServiceCorrelation,
    /// A metric datapoint.
    MetricDatapoint,
    /// A log entry.
    LogEntry,
    /// A mirrored audit event.
    AuditEvent,
}

/// How long a correlation row is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Kept for the standard retention window.
    #[default]
    Standard,
    /// Kept until explicitly removed.
    Permanent,
    /// Eligible for compaction in the next solitude round.
    Ephemeral,
}

// ============================================================================
// SECTION: Correlation Record
// ============================================================================

/// Metric fields present on metric-datapoint rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFields {
    /// Metric name.
    pub name: String,
    /// Metric value.
    pub value: f64,
}

/// Log fields present on log-entry rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFields {
    /// Log level label.
    pub level: String,
    /// Log message.
    pub message: String,
}

/// Service interaction record (also a time-series row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Correlation identifier; rows sharing an id form a chain.
    pub correlation_id: CorrelationId,
    /// Service category the interaction went through.
    pub service_type: ServiceType,
    /// Row kind.
    pub correlation_type: CorrelationType,
    /// Record time.
    pub timestamp: Timestamp,
    /// Metric fields for metric-datapoint rows.
    pub metric: Option<MetricFields>,
    /// Log fields for log-entry rows.
    pub log: Option<LogFields>,
    /// Free-form tags.
    pub tags: BTreeMap<String, String>,
    /// Retention policy for compaction.
    pub retention_policy: RetentionPolicy,
}
