// ciris-runtime/src/dmas.rs
// ============================================================================
// Module: LLM-Backed Decision-Making Algorithms
// Description: Production DMA implementations calling the LLM bus.
// Purpose: Turn thoughts into typed evaluations via structured generation.
// Dependencies: ciris-core, ciris-bus, serde_json
// ============================================================================

//! ## Overview
//! Each DMA builds a prompt from the thought and its context, requests a
//! structured response conforming to a JSON schema over the LLM bus, and
//! parses the response into its typed evaluation. Responses that fail to
//! parse are validation failures; the pipeline does not retry them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use ciris_bus::BusError;
use ciris_bus::LlmBus;
use ciris_core::ErrorClass;
use ciris_core::LlmMessage;
use ciris_core::LlmRole;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::Thought;
use ciris_core::dma::ActionSelectionContext;
use ciris_core::dma::ActionSelectionDma;
use ciris_core::dma::CommonSenseDma;
use ciris_core::dma::CommonSenseEvaluation;
use ciris_core::dma::DmaContext;
use ciris_core::dma::DomainDma;
use ciris_core::dma::DomainEvaluation;
use ciris_core::dma::EthicalDma;
use ciris_core::dma::EthicalEvaluation;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Model identifier requested from the LLM capability.
const DEFAULT_MODEL: &str = "ciris-default";

// ============================================================================
// SECTION: Shared Machinery
// ============================================================================

/// Maps a bus failure onto a service error for the pipeline.
fn bus_error(error: BusError) -> ServiceError {
    ServiceError::new(error.class(), error.to_string())
}

/// Parses a structured response into a typed evaluation.
fn parse_response<T: DeserializeOwned>(content: Value) -> Result<T, ServiceError> {
    serde_json::from_value(content).map_err(|err| {
        ServiceError::new(ErrorClass::Validation, format!("malformed dma response: {err}"))
    })
}

/// Builds the two-message prompt shared by every DMA.
fn build_messages(system: &str, user: String) -> Vec<LlmMessage> {
    vec![
        LlmMessage {
            role: LlmRole::System,
            content: system.to_string(),
        },
        LlmMessage {
            role: LlmRole::User,
            content: user,
        },
    ]
}

/// Renders the thought and task into the user prompt body.
fn describe_thought(thought: &Thought, context: &DmaContext) -> String {
    format!(
        "Task: {}\nThought (round {}): {}",
        context.task.description, thought.round_number, thought.content
    )
}

// ============================================================================
// SECTION: Principled DMA
// ============================================================================

/// Ethical-principles DMA backed by structured generation.
pub struct LlmEthicalDma {
    /// Bus used for generation.
    bus: Arc<LlmBus>,
}

impl LlmEthicalDma {
    /// Creates the DMA over the LLM bus.
    #[must_use]
    pub const fn new(bus: Arc<LlmBus>) -> Self {
        Self {
            bus,
        }
    }
}

#[async_trait]
impl EthicalDma for LlmEthicalDma {
    async fn evaluate(
        &self,
        thought: &Thought,
        context: &DmaContext,
    ) -> Result<EthicalEvaluation, ServiceError> {
        let schema = json!({
            "type": "object",
            "required": ["decision", "reasoning"],
            "properties": {
                "decision": {"enum": ["approve", "flag", "reject"]},
                "reasoning": {"type": "string"}
            }
        });
        let messages = build_messages(
            "Evaluate the thought against the agent's ethical principles: beneficence, \
             non-maleficence, integrity, respect for autonomy, and justice. Reject thoughts \
             that would cause harm.",
            describe_thought(thought, context),
        );
        let response = self
            .bus
            .generate_structured(DEFAULT_MODEL, &messages, &schema)
            .await
            .map_err(bus_error)?;
        parse_response(response.content)
    }
}

// ============================================================================
// SECTION: Common Sense DMA
// ============================================================================

/// Plausibility DMA backed by structured generation.
pub struct LlmCommonSenseDma {
    /// Bus used for generation.
    bus: Arc<LlmBus>,
}

impl LlmCommonSenseDma {
    /// Creates the DMA over the LLM bus.
    #[must_use]
    pub const fn new(bus: Arc<LlmBus>) -> Self {
        Self {
            bus,
        }
    }
}

#[async_trait]
impl CommonSenseDma for LlmCommonSenseDma {
    async fn evaluate(
        &self,
        thought: &Thought,
        context: &DmaContext,
    ) -> Result<CommonSenseEvaluation, ServiceError> {
        let schema = json!({
            "type": "object",
            "required": ["plausibility_score", "flags", "reasoning"],
            "properties": {
                "plausibility_score": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                "flags": {"type": "array", "items": {"type": "string"}},
                "reasoning": {"type": "string"}
            }
        });
        let messages = build_messages(
            "Score the plausibility and internal consistency of the thought. Flag physical \
             impossibilities, contradictions, and missing prerequisites.",
            describe_thought(thought, context),
        );
        let response = self
            .bus
            .generate_structured(DEFAULT_MODEL, &messages, &schema)
            .await
            .map_err(bus_error)?;
        parse_response(response.content)
    }
}

// ============================================================================
// SECTION: Domain DMA
// ============================================================================

/// Domain-rules DMA backed by structured generation.
pub struct LlmDomainDma {
    /// Bus used for generation.
    bus: Arc<LlmBus>,
    /// Named domain whose rules apply.
    domain: String,
}

impl LlmDomainDma {
    /// Creates the DMA for a named domain.
    #[must_use]
    pub fn new(bus: Arc<LlmBus>, domain: impl Into<String>) -> Self {
        Self {
            bus,
            domain: domain.into(),
        }
    }
}

#[async_trait]
impl DomainDma for LlmDomainDma {
    async fn evaluate(
        &self,
        thought: &Thought,
        context: &DmaContext,
    ) -> Result<DomainEvaluation, ServiceError> {
        let schema = json!({
            "type": "object",
            "required": ["domain", "alignment_score", "notes"],
            "properties": {
                "domain": {"type": "string"},
                "alignment_score": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                "notes": {"type": "string"}
            }
        });
        let messages = build_messages(
            &format!(
                "Evaluate how well the thought aligns with the rules and norms of the '{}' \
                 domain.",
                self.domain
            ),
            describe_thought(thought, context),
        );
        let response = self
            .bus
            .generate_structured(DEFAULT_MODEL, &messages, &schema)
            .await
            .map_err(bus_error)?;
        parse_response(response.content)
    }
}

// ============================================================================
// SECTION: Action Selection DMA
// ============================================================================

/// Action-selection DMA backed by structured generation.
pub struct LlmActionSelectionDma {
    /// Bus used for generation.
    bus: Arc<LlmBus>,
}

impl LlmActionSelectionDma {
    /// Creates the DMA over the LLM bus.
    #[must_use]
    pub const fn new(bus: Arc<LlmBus>) -> Self {
        Self {
            bus,
        }
    }
}

#[async_trait]
impl ActionSelectionDma for LlmActionSelectionDma {
    async fn select(
        &self,
        context: &ActionSelectionContext,
    ) -> Result<SelectedAction, ServiceError> {
        let schema = json!({
            "type": "object",
            "required": ["params", "rationale"],
            "properties": {
                "params": {
                    "type": "object",
                    "required": ["action", "params"],
                    "properties": {
                        "action": {"enum": [
                            "speak", "observe", "tool", "reject", "ponder", "defer",
                            "memorize", "recall", "forget", "task_complete"
                        ]},
                        "params": {"type": "object"}
                    }
                },
                "rationale": {"type": "string"}
            }
        });

        let evaluations = serde_json::to_string(&context.evaluations)
            .map_err(|err| ServiceError::validation(err.to_string()))?;
        let mut user = format!(
            "Thought: {}\nEvaluations: {evaluations}\nSelect exactly one action.",
            context.thought.content
        );
        if context.exploration {
            user.push_str("\nExploration mode is elevated; prefer novel but safe actions.");
        }
        if let Some(retry) = &context.retry {
            let original = serde_json::to_string(&retry.original)
                .map_err(|err| ServiceError::validation(err.to_string()))?;
            user.push_str(&format!(
                "\nYour previous selection {original} was reconsidered: {}\nAccount for the \
                 conscience insights and select again.",
                retry.override_reason
            ));
        }

        let messages = build_messages(
            "You choose the single next action for a moral-reasoning agent from the closed \
             action set. Prefer defer over reject when a response cannot be produced.",
            user,
        );
        let response = self
            .bus
            .generate_structured(DEFAULT_MODEL, &messages, &schema)
            .await
            .map_err(bus_error)?;
        parse_response(response.content)
    }
}
