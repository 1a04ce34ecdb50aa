// ciris-core/src/core/graph.rs
// ============================================================================
// Module: CIRIS Graph Memory Model
// Description: Graph nodes, edges, scopes, and the identity root.
// Purpose: Represent the agent's scoped memory store and durable identity.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Graph memory partitions nodes into scopes. The identity scope holds the
//! agent's durable self-description at the well-known root id; mutations to it
//! require an authority signature and pass the variance guard before any
//! handler may apply them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::NodeId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Well-known node id of the identity root.
pub const IDENTITY_ROOT_ID: &str = "agent/identity";

// ============================================================================
// SECTION: Scopes and Types
// ============================================================================

/// Partition of the graph memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphScope {
    /// Agent-local working memory.
    Local,
    /// Durable self-description; mutations are guarded.
    Identity,
    /// Facts about the operating environment.
    Environment,
    /// Knowledge shared within a community.
    Community,
    /// Knowledge shared across the network.
    Network,
}

impl fmt::Display for GraphScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Local => "local",
            Self::Identity => "identity",
            Self::Environment => "environment",
            Self::Community => "community",
            Self::Network => "network",
        };
        f.write_str(label)
    }
}

/// Kind of entity a graph node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// The agent itself.
    Agent,
    /// A human or automated user.
    User,
    /// A conversation channel.
    Channel,
    /// An abstract concept.
    Concept,
    /// Configuration state.
    Config,
    /// Identity root and related identity records.
    Identity,
    /// Time-series datapoint.
    TsdbData,
}

// ============================================================================
// SECTION: Nodes and Edges
// ============================================================================

/// Node in the scoped graph memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node identifier, unique within its scope.
    pub id: NodeId,
    /// Entity kind.
    pub node_type: NodeType,
    /// Memory scope holding the node.
    pub scope: GraphScope,
    /// Structured attributes (JSON object).
    pub attributes: Value,
    /// Version counter incremented on every write.
    pub version: u64,
}

impl GraphNode {
    /// Creates a first-version node.
    #[must_use]
    pub fn new(id: NodeId, node_type: NodeType, scope: GraphScope, attributes: Value) -> Self {
        Self {
            id,
            node_type,
            scope,
            attributes,
            version: 1,
        }
    }

    /// Returns true when this node is the identity root.
    #[must_use]
    pub fn is_identity_root(&self) -> bool {
        self.scope == GraphScope::Identity && self.id.as_str() == IDENTITY_ROOT_ID
    }
}

/// Directed edge between two graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node identifier.
    pub from_id: NodeId,
    /// Target node identifier.
    pub to_id: NodeId,
    /// Relation label.
    pub relation: String,
    /// Structured attributes (JSON object).
    pub attributes: Value,
}
