// ciris-runtime/src/providers.rs
// ============================================================================
// Module: Built-In Providers
// Description: Local capability providers backed by the persistence store.
// Purpose: Make memory and telemetry work without external services.
// Dependencies: ciris-core
// ============================================================================

//! ## Overview
//! The composition root registers these local providers so a fresh runtime
//! can memorize, recall, and record metrics before any adapter registers
//! richer implementations. Both simply bridge a persistence trait onto a
//! capability trait; remote providers registered at higher priority take
//! over transparently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ciris_core::Clock;
use ciris_core::Correlation;
use ciris_core::CorrelationId;
use ciris_core::CorrelationStore;
use ciris_core::CorrelationType;
use ciris_core::GraphEdge;
use ciris_core::GraphNode;
use ciris_core::GraphScope;
use ciris_core::GraphStore;
use ciris_core::MemoryCapability;
use ciris_core::MetricFields;
use ciris_core::NodeId;
use ciris_core::NodeType;
use ciris_core::RetentionPolicy;
use ciris_core::ServiceError;
use ciris_core::ServiceType;
use ciris_core::TelemetryCapability;
use uuid::Uuid;

// ============================================================================
// SECTION: Local Graph Memory
// ============================================================================

/// Memory capability bridging onto the local graph store.
pub struct LocalGraphMemory {
    /// Backing graph store.
    graph: Arc<dyn GraphStore>,
}

impl LocalGraphMemory {
    /// Creates the provider.
    #[must_use]
    pub const fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self {
            graph,
        }
    }
}

#[async_trait]
impl MemoryCapability for LocalGraphMemory {
    async fn put_node(&self, node: &GraphNode) -> Result<(), ServiceError> {
        self.graph.put_node(node).map_err(ServiceError::from)
    }

    async fn get_node(
        &self,
        scope: GraphScope,
        id: &NodeId,
    ) -> Result<Option<GraphNode>, ServiceError> {
        self.graph.get_node(scope, id).map_err(ServiceError::from)
    }

    async fn delete_node(&self, scope: GraphScope, id: &NodeId) -> Result<(), ServiceError> {
        self.graph.delete_node(scope, id).map_err(ServiceError::from)
    }

    async fn query_nodes(
        &self,
        scope: GraphScope,
        node_type: Option<NodeType>,
        id_prefix: Option<&str>,
    ) -> Result<Vec<GraphNode>, ServiceError> {
        self.graph.query_nodes(scope, node_type, id_prefix).map_err(ServiceError::from)
    }

    async fn put_edge(&self, edge: &GraphEdge) -> Result<(), ServiceError> {
        self.graph.put_edge(edge).map_err(ServiceError::from)
    }
}

// ============================================================================
// SECTION: Local Telemetry
// ============================================================================

/// Telemetry capability recording metric datapoints as correlation rows.
pub struct LocalTelemetry {
    /// Backing correlation store.
    correlations: Arc<dyn CorrelationStore>,
    /// Clock stamping datapoints.
    clock: Arc<dyn Clock>,
}

impl LocalTelemetry {
    /// Creates the provider.
    #[must_use]
    pub fn new(correlations: Arc<dyn CorrelationStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            correlations,
            clock,
        }
    }
}

#[async_trait]
impl TelemetryCapability for LocalTelemetry {
    async fn record_metric(
        &self,
        name: &str,
        value: f64,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ServiceError> {
        let row = Correlation {
            correlation_id: CorrelationId::new(Uuid::new_v4().to_string()),
            service_type: ServiceType::Telemetry,
            correlation_type: CorrelationType::MetricDatapoint,
            timestamp: self.clock.now(),
            metric: Some(MetricFields {
                name: name.to_string(),
                value,
            }),
            log: None,
            tags: tags.clone(),
            retention_policy: RetentionPolicy::Ephemeral,
        };
        self.correlations.add_correlation(&row).map_err(ServiceError::from)
    }
}
