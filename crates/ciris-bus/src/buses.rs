// ciris-bus/src/buses.rs
// ============================================================================
// Module: Typed Service Buses
// Description: One typed fan-out bus per service category.
// Purpose: Give handlers a typed request/response surface per capability.
// Dependencies: ciris-core, ciris-registry, crate::bus, crate::retry
// ============================================================================

//! ## Overview
//! Ten bus kinds exist, one per service category. A bus method names its
//! capability, which must match a capability string the provider advertised
//! at registration. Every method routes through the bus core for selection,
//! retries, breaker reporting, and correlation recording. The bus is the only
//! path from a handler to a service; handlers never hold provider references.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use ciris_core::ActionKind;
use ciris_core::AuditEvent;
use ciris_core::AuditSink;
use ciris_core::ChannelId;
use ciris_core::ChatMessage;
use ciris_core::CommunicationCapability;
use ciris_core::FilterCapability;
use ciris_core::FilterVerdict;
use ciris_core::GraphEdge;
use ciris_core::GraphNode;
use ciris_core::GraphScope;
use ciris_core::GuidanceRequest;
use ciris_core::GuidanceResult;
use ciris_core::LlmCapability;
use ciris_core::LlmMessage;
use ciris_core::MemoryCapability;
use ciris_core::NodeId;
use ciris_core::NodeType;
use ciris_core::QueueStatus;
use ciris_core::RuntimeControlCapability;
use ciris_core::SecretRef;
use ciris_core::SecretsCapability;
use ciris_core::ServiceError;
use ciris_core::ServiceType;
use ciris_core::StructuredResponse;
use ciris_core::TaskId;
use ciris_core::TelemetryCapability;
use ciris_core::ToolCapability;
use ciris_core::ToolDescriptor;
use ciris_core::ToolResult;
use ciris_core::WiseAuthorityCapability;
use ciris_registry::ServiceProvider;
use serde_json::Value;

use crate::bus::BusCore;
use crate::bus::BusError;
use crate::retry::RetryPolicy;

// ============================================================================
// SECTION: Provider Extraction
// ============================================================================

/// Extracts a communication provider or fails with a validation error.
fn as_communication(
    provider: ServiceProvider,
) -> Result<Arc<dyn CommunicationCapability>, ServiceError> {
    match provider {
        ServiceProvider::Communication(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not a communication capability")),
    }
}

/// Extracts a memory provider or fails with a validation error.
fn as_memory(provider: ServiceProvider) -> Result<Arc<dyn MemoryCapability>, ServiceError> {
    match provider {
        ServiceProvider::Memory(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not a memory capability")),
    }
}

/// Extracts a tool provider or fails with a validation error.
fn as_tool(provider: ServiceProvider) -> Result<Arc<dyn ToolCapability>, ServiceError> {
    match provider {
        ServiceProvider::Tool(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not a tool capability")),
    }
}

/// Extracts a wise-authority provider or fails with a validation error.
fn as_wise_authority(
    provider: ServiceProvider,
) -> Result<Arc<dyn WiseAuthorityCapability>, ServiceError> {
    match provider {
        ServiceProvider::WiseAuthority(inner) => Ok(inner),
        _ => {
            Err(ServiceError::validation("registered provider is not a wise-authority capability"))
        }
    }
}

/// Extracts an LLM provider or fails with a validation error.
fn as_llm(provider: ServiceProvider) -> Result<Arc<dyn LlmCapability>, ServiceError> {
    match provider {
        ServiceProvider::Llm(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not an llm capability")),
    }
}

/// Extracts a filter provider or fails with a validation error.
fn as_filter(provider: ServiceProvider) -> Result<Arc<dyn FilterCapability>, ServiceError> {
    match provider {
        ServiceProvider::Filter(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not a filter capability")),
    }
}

/// Extracts an audit sink or fails with a validation error.
fn as_audit(provider: ServiceProvider) -> Result<Arc<dyn AuditSink>, ServiceError> {
    match provider {
        ServiceProvider::Audit(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not an audit capability")),
    }
}

/// Extracts a telemetry provider or fails with a validation error.
fn as_telemetry(provider: ServiceProvider) -> Result<Arc<dyn TelemetryCapability>, ServiceError> {
    match provider {
        ServiceProvider::Telemetry(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not a telemetry capability")),
    }
}

/// Extracts a runtime-control provider or fails with a validation error.
fn as_runtime_control(
    provider: ServiceProvider,
) -> Result<Arc<dyn RuntimeControlCapability>, ServiceError> {
    match provider {
        ServiceProvider::RuntimeControl(inner) => Ok(inner),
        _ => Err(ServiceError::validation(
            "registered provider is not a runtime-control capability",
        )),
    }
}

/// Extracts a secrets provider or fails with a validation error.
fn as_secrets(provider: ServiceProvider) -> Result<Arc<dyn SecretsCapability>, ServiceError> {
    match provider {
        ServiceProvider::Secrets(inner) => Ok(inner),
        _ => Err(ServiceError::validation("registered provider is not a secrets capability")),
    }
}

// ============================================================================
// SECTION: Communication Bus
// ============================================================================

/// Typed bus for message delivery and retrieval.
pub struct CommunicationBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for communication operations.
    policy: RetryPolicy,
}

impl CommunicationBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::http_like(),
        }
    }

    /// Delivers content to a channel; returns true when accepted.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when no provider can deliver.
    pub async fn send_message(
        &self,
        channel_id: &ChannelId,
        content: &str,
    ) -> Result<bool, BusError> {
        self.core
            .call(ServiceType::Communication, "send_message", &self.policy, |provider| {
                let channel_id = channel_id.clone();
                let content = content.to_string();
                async move {
                    let provider = as_communication(provider)?;
                    provider.send_message(&channel_id, &content).await
                }
            })
            .await
    }

    /// Fetches up to `limit` recent messages from a channel.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when no provider can fetch.
    pub async fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, BusError> {
        self.core
            .call(ServiceType::Communication, "fetch_messages", &self.policy, |provider| {
                let channel_id = channel_id.clone();
                async move {
                    let provider = as_communication(provider)?;
                    provider.fetch_messages(&channel_id, limit).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Memory Bus
// ============================================================================

/// Typed bus for graph memory storage.
pub struct MemoryBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for memory operations.
    policy: RetryPolicy,
}

impl MemoryBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::file_like(),
        }
    }

    /// Stores a node.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the write fails.
    pub async fn put_node(&self, node: &GraphNode) -> Result<(), BusError> {
        self.core
            .call(ServiceType::Memory, "put_node", &self.policy, |provider| {
                let node = node.clone();
                async move {
                    let provider = as_memory(provider)?;
                    provider.put_node(&node).await
                }
            })
            .await
    }

    /// Retrieves a node by scope and id.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the read fails.
    pub async fn get_node(
        &self,
        scope: GraphScope,
        id: &NodeId,
    ) -> Result<Option<GraphNode>, BusError> {
        self.core
            .call(ServiceType::Memory, "get_node", &self.policy, |provider| {
                let id = id.clone();
                async move {
                    let provider = as_memory(provider)?;
                    provider.get_node(scope, &id).await
                }
            })
            .await
    }

    /// Removes a node by scope and id.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the delete fails.
    pub async fn delete_node(&self, scope: GraphScope, id: &NodeId) -> Result<(), BusError> {
        self.core
            .call(ServiceType::Memory, "delete_node", &self.policy, |provider| {
                let id = id.clone();
                async move {
                    let provider = as_memory(provider)?;
                    provider.delete_node(scope, &id).await
                }
            })
            .await
    }

    /// Queries nodes by scope with optional filters.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the query fails.
    pub async fn query_nodes(
        &self,
        scope: GraphScope,
        node_type: Option<NodeType>,
        id_prefix: Option<&str>,
    ) -> Result<Vec<GraphNode>, BusError> {
        self.core
            .call(ServiceType::Memory, "query_nodes", &self.policy, |provider| {
                let id_prefix = id_prefix.map(str::to_string);
                async move {
                    let provider = as_memory(provider)?;
                    provider.query_nodes(scope, node_type, id_prefix.as_deref()).await
                }
            })
            .await
    }

    /// Stores a directed edge.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the write fails.
    pub async fn put_edge(&self, edge: &GraphEdge) -> Result<(), BusError> {
        self.core
            .call(ServiceType::Memory, "put_edge", &self.policy, |provider| {
                let edge = edge.clone();
                async move {
                    let provider = as_memory(provider)?;
                    provider.put_edge(&edge).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Tool Bus
// ============================================================================

/// Typed bus for external tool execution.
pub struct ToolBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for tool operations.
    policy: RetryPolicy,
}

impl ToolBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::http_like(),
        }
    }

    /// Lists tools across the selected provider.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when listing fails.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BusError> {
        self.core
            .call(ServiceType::Tool, "list_tools", &self.policy, |provider| async move {
                let provider = as_tool(provider)?;
                provider.list_tools().await
            })
            .await
    }

    /// Executes a named tool with validated parameters.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when execution fails.
    pub async fn execute_tool(&self, name: &str, params: &Value) -> Result<ToolResult, BusError> {
        self.core
            .call(ServiceType::Tool, "execute_tool", &self.policy, |provider| {
                let name = name.to_string();
                let params = params.clone();
                async move {
                    let provider = as_tool(provider)?;
                    provider.execute_tool(&name, &params).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Wise Authority Bus
// ============================================================================

/// Typed bus for deferral approval and guidance.
pub struct WiseAuthorityBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for authority operations.
    policy: RetryPolicy,
}

impl WiseAuthorityBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::http_like(),
        }
    }

    /// Requests guidance for a task.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the authority is unreachable.
    pub async fn request_guidance(
        &self,
        request: &GuidanceRequest,
    ) -> Result<GuidanceResult, BusError> {
        self.core
            .call(ServiceType::WiseAuthority, "request_guidance", &self.policy, |provider| {
                let request = request.clone();
                async move {
                    let provider = as_wise_authority(provider)?;
                    provider.request_guidance(&request).await
                }
            })
            .await
    }

    /// Submits a deferral for later adjudication.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when submission fails.
    pub async fn submit_deferral(&self, task_id: &TaskId, reason: &str) -> Result<(), BusError> {
        self.core
            .call(ServiceType::WiseAuthority, "submit_deferral", &self.policy, |provider| {
                let task_id = task_id.clone();
                let reason = reason.to_string();
                async move {
                    let provider = as_wise_authority(provider)?;
                    provider.submit_deferral(&task_id, &reason).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: LLM Bus
// ============================================================================

/// Typed bus for structured language-model generation.
pub struct LlmBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for generation operations.
    policy: RetryPolicy,
}

impl LlmBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::http_like(),
        }
    }

    /// Generates a structured response conforming to `response_schema`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when generation fails.
    pub async fn generate_structured(
        &self,
        model: &str,
        messages: &[LlmMessage],
        response_schema: &Value,
    ) -> Result<StructuredResponse, BusError> {
        self.core
            .call(ServiceType::Llm, "generate_structured", &self.policy, |provider| {
                let model = model.to_string();
                let messages = messages.to_vec();
                let response_schema = response_schema.clone();
                async move {
                    let provider = as_llm(provider)?;
                    provider.generate_structured(&model, &messages, &response_schema).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Filter Bus
// ============================================================================

/// Typed bus for content filtering.
pub struct FilterBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for filter operations.
    policy: RetryPolicy,
}

impl FilterBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::none(),
        }
    }

    /// Checks content and returns a verdict.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the filter cannot evaluate.
    pub async fn check(&self, content: &str, direction: &str) -> Result<FilterVerdict, BusError> {
        self.core
            .call(ServiceType::Filter, "check", &self.policy, |provider| {
                let content = content.to_string();
                let direction = direction.to_string();
                async move {
                    let provider = as_filter(provider)?;
                    provider.check(&content, &direction).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Audit Bus
// ============================================================================

/// Typed bus for audit event logging.
pub struct AuditBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for audit operations.
    policy: RetryPolicy,
}

impl AuditBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::file_like(),
        }
    }

    /// Records an audit event through the selected sink.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when no sink can record the event.
    pub async fn log(&self, event: &AuditEvent) -> Result<(), BusError> {
        self.core
            .call(ServiceType::Audit, "log", &self.policy, |provider| {
                let event = event.clone();
                async move {
                    let provider = as_audit(provider)?;
                    provider.log(&event)
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Telemetry Bus
// ============================================================================

/// Typed bus for metric recording.
pub struct TelemetryBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for telemetry operations.
    policy: RetryPolicy,
}

impl TelemetryBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::none(),
        }
    }

    /// Records a metric datapoint.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when recording fails.
    pub async fn record_metric(
        &self,
        name: &str,
        value: f64,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), BusError> {
        self.core
            .call(ServiceType::Telemetry, "record_metric", &self.policy, |provider| {
                let name = name.to_string();
                let tags = tags.clone();
                async move {
                    let provider = as_telemetry(provider)?;
                    provider.record_metric(&name, value, &tags).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Runtime Control Bus
// ============================================================================

/// Typed bus for operator runtime control.
pub struct RuntimeControlBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for control operations.
    policy: RetryPolicy,
}

impl RuntimeControlBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::none(),
        }
    }

    /// Pauses the processor loop.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the processor is unreachable.
    pub async fn pause(&self) -> Result<(), BusError> {
        self.core
            .call(ServiceType::RuntimeControl, "pause", &self.policy, |provider| async move {
                let provider = as_runtime_control(provider)?;
                provider.pause().await
            })
            .await
    }

    /// Resumes the processor loop.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the processor is unreachable.
    pub async fn resume(&self) -> Result<(), BusError> {
        self.core
            .call(ServiceType::RuntimeControl, "resume", &self.policy, |provider| async move {
                let provider = as_runtime_control(provider)?;
                provider.resume().await
            })
            .await
    }

    /// Processes one round while paused; returns thoughts processed.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the processor is unreachable.
    pub async fn single_step(&self) -> Result<usize, BusError> {
        self.core
            .call(ServiceType::RuntimeControl, "single_step", &self.policy, |provider| async move {
                let provider = as_runtime_control(provider)?;
                provider.single_step().await
            })
            .await
    }

    /// Returns the current queue snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the processor is unreachable.
    pub async fn queue_status(&self) -> Result<QueueStatus, BusError> {
        self.core
            .call(ServiceType::RuntimeControl, "queue_status", &self.policy, |provider| async move {
                let provider = as_runtime_control(provider)?;
                provider.queue_status().await
            })
            .await
    }
}

// ============================================================================
// SECTION: Secrets Bus
// ============================================================================

/// Typed bus for secret encapsulation and decapsulation.
pub struct SecretsBus {
    /// Shared bus machinery.
    core: Arc<BusCore>,
    /// Retry policy for secrets operations.
    policy: RetryPolicy,
}

impl SecretsBus {
    /// Creates the bus.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::file_like(),
        }
    }

    /// Replaces secret material in `content` with opaque references.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when encapsulation fails.
    pub async fn encapsulate(
        &self,
        content: &str,
        context: &str,
    ) -> Result<(String, Vec<SecretRef>), BusError> {
        self.core
            .call(ServiceType::Secrets, "encapsulate", &self.policy, |provider| {
                let content = content.to_string();
                let context = context.to_string();
                async move {
                    let provider = as_secrets(provider)?;
                    provider.encapsulate(&content, &context).await
                }
            })
            .await
    }

    /// Restores secret material for references the action is entitled to.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when decapsulation fails or is not permitted.
    pub async fn decapsulate(
        &self,
        content: &str,
        action: ActionKind,
        context: &str,
    ) -> Result<String, BusError> {
        self.core
            .call(ServiceType::Secrets, "decapsulate", &self.policy, |provider| {
                let content = content.to_string();
                let context = context.to_string();
                async move {
                    let provider = as_secrets(provider)?;
                    provider.decapsulate(&content, action, &context).await
                }
            })
            .await
    }
}

// ============================================================================
// SECTION: Bus Bundle
// ============================================================================

/// All ten buses wired over one core, as handed to handlers.
pub struct BusBundle {
    /// Message delivery and retrieval.
    pub communication: CommunicationBus,
    /// Graph memory storage.
    pub memory: MemoryBus,
    /// External tool execution.
    pub tool: ToolBus,
    /// Deferral approval and guidance.
    pub wise_authority: WiseAuthorityBus,
    /// Structured language-model generation.
    pub llm: LlmBus,
    /// Content filtering.
    pub filter: FilterBus,
    /// Audit event logging.
    pub audit: AuditBus,
    /// Metric recording.
    pub telemetry: TelemetryBus,
    /// Operator runtime control.
    pub runtime_control: RuntimeControlBus,
    /// Secret encapsulation and decapsulation.
    pub secrets: SecretsBus,
}

impl BusBundle {
    /// Wires every bus over one shared core.
    #[must_use]
    pub fn new(core: Arc<BusCore>) -> Self {
        Self {
            communication: CommunicationBus::new(Arc::clone(&core)),
            memory: MemoryBus::new(Arc::clone(&core)),
            tool: ToolBus::new(Arc::clone(&core)),
            wise_authority: WiseAuthorityBus::new(Arc::clone(&core)),
            llm: LlmBus::new(Arc::clone(&core)),
            filter: FilterBus::new(Arc::clone(&core)),
            audit: AuditBus::new(Arc::clone(&core)),
            telemetry: TelemetryBus::new(Arc::clone(&core)),
            runtime_control: RuntimeControlBus::new(Arc::clone(&core)),
            secrets: SecretsBus::new(core),
        }
    }
}
