// ciris-core/src/interfaces/mod.rs
// ============================================================================
// Module: CIRIS Interfaces
// Description: Backend-agnostic interfaces for capabilities and persistence.
// Purpose: Define the contract surfaces used by the CIRIS runtime.
// Dependencies: async-trait, serde, crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the core integrates with adapters, model providers,
//! and storage without embedding backend-specific details. Capability traits
//! are the only shapes the buses see; persistence traits are the only shapes
//! the processor sees. Implementations must fail closed on missing or invalid
//! data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::action::ActionKind;
use crate::core::audit::AuditEvent;
use crate::core::correlation::Correlation;
use crate::core::correlation::CorrelationType;
use crate::core::graph::GraphEdge;
use crate::core::graph::GraphNode;
use crate::core::graph::GraphScope;
use crate::core::graph::NodeType;
use crate::core::identifiers::ChannelId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::ScheduledTaskId;
use crate::core::identifiers::TaskId;
use crate::core::identifiers::ThoughtId;
use crate::core::identifiers::WaId;
use crate::core::scheduled::ScheduledTask;
use crate::core::task::Task;
use crate::core::task::TaskOutcome;
use crate::core::task::TaskStatus;
use crate::core::thought::Thought;
use crate::core::thought::ThoughtStatus;
use crate::core::time::Timestamp;
use crate::core::ErrorClass;
use crate::core::SelectedAction;
use crate::core::ServiceError;

// ============================================================================
// SECTION: Communication Capability
// ============================================================================

/// Message fetched from a channel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author identifier on the adapter side.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Message content.
    pub content: String,
    /// Adapter-observed message time.
    pub timestamp: Timestamp,
}

/// Message delivery and retrieval capability.
#[async_trait]
pub trait CommunicationCapability: Send + Sync {
    /// Delivers content to a channel; returns true when accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when delivery fails.
    async fn send_message(
        &self,
        channel_id: &ChannelId,
        content: &str,
    ) -> Result<bool, ServiceError>;

    /// Fetches up to `limit` recent messages from a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when retrieval fails.
    async fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ServiceError>;
}

// ============================================================================
// SECTION: Tool Capability
// ============================================================================

/// Description of an invocable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Registered tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for the tool arguments.
    pub parameters_schema: Value,
}

/// Result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool reported success.
    pub success: bool,
    /// Structured tool output.
    pub output: Value,
    /// Failure description when unsuccessful.
    pub error: Option<String>,
}

/// External tool execution capability.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    /// Lists the tools this provider exposes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when listing fails.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ServiceError>;

    /// Executes a named tool with validated parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the tool is unknown or execution fails.
    async fn execute_tool(&self, name: &str, params: &Value) -> Result<ToolResult, ServiceError>;
}

// ============================================================================
// SECTION: Memory Capability
// ============================================================================

/// Graph memory storage capability.
#[async_trait]
pub trait MemoryCapability: Send + Sync {
    /// Stores a node, replacing any prior version.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the write fails.
    async fn put_node(&self, node: &GraphNode) -> Result<(), ServiceError>;

    /// Retrieves a node by scope and id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    async fn get_node(
        &self,
        scope: GraphScope,
        id: &NodeId,
    ) -> Result<Option<GraphNode>, ServiceError>;

    /// Removes a node by scope and id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the delete fails.
    async fn delete_node(&self, scope: GraphScope, id: &NodeId) -> Result<(), ServiceError>;

    /// Queries nodes by scope with optional type and id-prefix filters.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the query fails.
    async fn query_nodes(
        &self,
        scope: GraphScope,
        node_type: Option<NodeType>,
        id_prefix: Option<&str>,
    ) -> Result<Vec<GraphNode>, ServiceError>;

    /// Stores a directed edge.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the write fails.
    async fn put_edge(&self, edge: &GraphEdge) -> Result<(), ServiceError>;
}

// ============================================================================
// SECTION: Wise Authority Capability
// ============================================================================

/// Guidance request context sent to a Wise Authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceRequest {
    /// Task awaiting guidance.
    pub task_id: TaskId,
    /// Thought that raised the request, if any.
    pub thought_id: Option<ThoughtId>,
    /// Question put to the authority.
    pub question: String,
    /// Structured supporting context.
    pub context: Value,
}

/// Guidance returned by a Wise Authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidanceResult {
    /// Guidance text, when the authority answered.
    pub guidance: Option<String>,
    /// Authority that answered.
    pub wa_id: WaId,
}

/// Deferral approval and guidance capability.
#[async_trait]
pub trait WiseAuthorityCapability: Send + Sync {
    /// Requests guidance for a task.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the authority is unreachable.
    async fn request_guidance(
        &self,
        request: &GuidanceRequest,
    ) -> Result<GuidanceResult, ServiceError>;

    /// Submits a deferral for later adjudication.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when submission fails.
    async fn submit_deferral(&self, task_id: &TaskId, reason: &str) -> Result<(), ServiceError>;
}

// ============================================================================
// SECTION: LLM Capability
// ============================================================================

/// Role of a chat message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmRole {
    /// System instruction.
    System,
    /// User content.
    User,
    /// Prior assistant content.
    Assistant,
}

/// Chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    /// Message role.
    pub role: LlmRole,
    /// Message content.
    pub content: String,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced in the completion.
    pub completion_tokens: u64,
}

/// Structured model response conforming to a requested schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    /// Response content conforming to the requested schema.
    pub content: Value,
    /// Token accounting for the call.
    pub usage: TokenUsage,
}

/// Structured language-model generation capability.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    /// Generates a structured response conforming to `response_schema`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when generation fails or the response does
    /// not conform to the schema.
    async fn generate_structured(
        &self,
        model: &str,
        messages: &[LlmMessage],
        response_schema: &Value,
    ) -> Result<StructuredResponse, ServiceError>;
}

// ============================================================================
// SECTION: Secrets Capability
// ============================================================================

/// Reference to an encapsulated secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Opaque reference token embedded in content.
    pub ref_id: String,
    /// Label describing the secret kind.
    pub label: String,
}

/// Secret encapsulation and decapsulation capability.
///
/// The cipher itself is external; the core only moves opaque references.
#[async_trait]
pub trait SecretsCapability: Send + Sync {
    /// Replaces secret material in `content` with opaque references.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when encapsulation fails.
    async fn encapsulate(
        &self,
        content: &str,
        context: &str,
    ) -> Result<(String, Vec<SecretRef>), ServiceError>;

    /// Restores secret material for references the action is entitled to.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when decapsulation fails or is not permitted
    /// for the action kind.
    async fn decapsulate(
        &self,
        content: &str,
        action: ActionKind,
        context: &str,
    ) -> Result<String, ServiceError>;
}

// ============================================================================
// SECTION: Telemetry Capability
// ============================================================================

/// Metric recording capability.
#[async_trait]
pub trait TelemetryCapability: Send + Sync {
    /// Records a metric datapoint.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when recording fails.
    async fn record_metric(
        &self,
        name: &str,
        value: f64,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ServiceError>;
}

// ============================================================================
// SECTION: Filter Capability
// ============================================================================

/// Verdict returned by a content filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterVerdict {
    /// Whether the content may proceed.
    pub allowed: bool,
    /// Reason when blocked.
    pub reason: Option<String>,
}

/// Content filtering capability applied to ingress and egress text.
#[async_trait]
pub trait FilterCapability: Send + Sync {
    /// Checks content and returns a verdict.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the filter cannot evaluate.
    async fn check(&self, content: &str, direction: &str) -> Result<FilterVerdict, ServiceError>;
}

// ============================================================================
// SECTION: Runtime Control Capability
// ============================================================================

/// Snapshot of the processor's thought queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Thoughts waiting for a round.
    pub pending: usize,
    /// Thoughts currently being processed.
    pub processing: usize,
}

/// Operator runtime-control capability.
#[async_trait]
pub trait RuntimeControlCapability: Send + Sync {
    /// Pauses the processor loop.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the processor is unreachable.
    async fn pause(&self) -> Result<(), ServiceError>;

    /// Resumes the processor loop.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the processor is unreachable.
    async fn resume(&self) -> Result<(), ServiceError>;

    /// Processes one round while paused; returns thoughts processed.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the processor is unreachable.
    async fn single_step(&self) -> Result<usize, ServiceError>;

    /// Returns the current queue snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the processor is unreachable.
    async fn queue_status(&self) -> Result<QueueStatus, ServiceError>;
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Audit event recording capability.
///
/// Usually satisfied by the core's own audit chain; external sinks may mirror.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the event cannot be recorded; append
    /// failures are fatal to chain integrity.
    fn log(&self, event: &AuditEvent) -> Result<(), ServiceError>;
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Persistence store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Requested entity does not exist.
    #[error("store entity not found: {0}")]
    NotFound(String),
    /// Requested state transition is illegal.
    #[error("store illegal transition: {0}")]
    IllegalTransition(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Maps the store failure onto the shared error taxonomy.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) | Self::Store(_) => ErrorClass::Transient,
            Self::Corrupt(_) | Self::VersionMismatch(_) => ErrorClass::Fatal,
            Self::Invalid(_) | Self::IllegalTransition(_) => ErrorClass::Validation,
            Self::NotFound(_) => ErrorClass::NotFound,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        Self::new(error.class(), error.to_string())
    }
}

// ============================================================================
// SECTION: Task Store
// ============================================================================

/// Typed persistence for tasks.
pub trait TaskStore: Send + Sync {
    /// Inserts a new task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn add_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Retrieves a task by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Transitions a task's status, recording an outcome when terminal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalTransition`] when the transition violates
    /// the task lifecycle, and [`StoreError::Invalid`] when a completion
    /// carries no outcome.
    fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        outcome: Option<&TaskOutcome>,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// Lists tasks in the given status, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;

    /// Records an accountability signature on a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn sign_task(
        &self,
        task_id: &TaskId,
        signed_by: &str,
        signature: &str,
        signed_at: Timestamp,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Thought Store
// ============================================================================

/// Typed persistence for thoughts.
pub trait ThoughtStore: Send + Sync {
    /// Inserts a new thought.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn add_thought(&self, thought: &Thought) -> Result<(), StoreError>;

    /// Retrieves a thought by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_thought(&self, thought_id: &ThoughtId) -> Result<Option<Thought>, StoreError>;

    /// Transitions a thought's status, recording the final action if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn update_thought_status(
        &self,
        thought_id: &ThoughtId,
        status: ThoughtStatus,
        final_action: Option<&SelectedAction>,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// Lists up to `limit` pending thoughts in creation order per task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_pending_thoughts(&self, limit: usize) -> Result<Vec<Thought>, StoreError>;

    /// Lists the children of a thought.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_child_thoughts(&self, parent_id: &ThoughtId) -> Result<Vec<Thought>, StoreError>;

    /// Counts thoughts in pending or processing status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn count_active_thoughts(&self) -> Result<usize, StoreError>;

    /// Lists every thought belonging to a task in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_thoughts_for_task(&self, task_id: &TaskId) -> Result<Vec<Thought>, StoreError>;

    /// Increments the ponder counter on a thought.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn increment_ponder_count(&self, thought_id: &ThoughtId, now: Timestamp)
    -> Result<(), StoreError>;

    /// Replaces a thought's context (epistemic data accumulation).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn update_thought_context(
        &self,
        thought_id: &ThoughtId,
        context: &crate::core::ThoughtContext,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// Resets processing thoughts to pending; used for crash recovery.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn recover_processing_thoughts(&self, now: Timestamp) -> Result<usize, StoreError>;
}

// ============================================================================
// SECTION: Correlation Store
// ============================================================================

/// Typed persistence for correlations.
pub trait CorrelationStore: Send + Sync {
    /// Inserts a correlation row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn add_correlation(&self, correlation: &Correlation) -> Result<(), StoreError>;

    /// Queries rows in a time range with optional type and tag filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn query_correlations(
        &self,
        from: Timestamp,
        to: Timestamp,
        correlation_type: Option<CorrelationType>,
        tags: &BTreeMap<String, String>,
    ) -> Result<Vec<Correlation>, StoreError>;

    /// Removes ephemeral rows older than `cutoff`; returns rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn compact_correlations(&self, cutoff: Timestamp) -> Result<usize, StoreError>;
}

// ============================================================================
// SECTION: Graph Store
// ============================================================================

/// Typed persistence for graph memory.
pub trait GraphStore: Send + Sync {
    /// Stores a node, replacing any prior version and bumping `version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_node(&self, node: &GraphNode) -> Result<(), StoreError>;

    /// Retrieves a node by scope and id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_node(&self, scope: GraphScope, id: &NodeId) -> Result<Option<GraphNode>, StoreError>;

    /// Removes a node by scope and id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_node(&self, scope: GraphScope, id: &NodeId) -> Result<(), StoreError>;

    /// Queries nodes by scope with optional type and id-prefix filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn query_nodes(
        &self,
        scope: GraphScope,
        node_type: Option<NodeType>,
        id_prefix: Option<&str>,
    ) -> Result<Vec<GraphNode>, StoreError>;

    /// Stores a directed edge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_edge(&self, edge: &GraphEdge) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Scheduled Task Store
// ============================================================================

/// Typed persistence for scheduled tasks.
pub trait ScheduledTaskStore: Send + Sync {
    /// Inserts or replaces a scheduled task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_scheduled(&self, task: &ScheduledTask) -> Result<(), StoreError>;

    /// Lists entries due at `now` within the lookahead window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn due_scheduled(
        &self,
        now: Timestamp,
        lookahead_millis: i64,
    ) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Marks an entry as triggered, completing one-shot entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn mark_triggered(&self, id: &ScheduledTaskId, now: Timestamp) -> Result<(), StoreError>;
}
