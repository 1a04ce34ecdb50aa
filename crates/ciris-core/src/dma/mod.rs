// ciris-core/src/dma/mod.rs
// ============================================================================
// Module: CIRIS Decision-Making Algorithms
// Description: DMA trait seams, typed evaluations, and selection context.
// Purpose: Define the layered evaluation contract the pipeline composes.
// Dependencies: async-trait, serde, crate::core
// ============================================================================

//! ## Overview
//! A DMA takes a thought plus context and returns a typed evaluation. Three
//! faculty DMAs (ethical, common-sense, domain) run concurrently; the action
//! selection DMA consumes their results and picks exactly one action from the
//! closed set. Implementations are pluggable; production DMAs call the LLM
//! bus, test DMAs are deterministic stubs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod conscience;
pub mod pipeline;
pub mod variance;

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::core::GraphNode;
use crate::core::SelectedAction;
use crate::core::ServiceError;
use crate::core::Task;
use crate::core::Thought;
use crate::core::thought::EpistemicInsight;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use conscience::Conscience;
pub use conscience::ConscienceFaculty;
pub use conscience::ConscienceResult;
pub use conscience::ConscienceThresholds;
pub use conscience::FacultyReport;
pub use pipeline::DmaPipeline;
pub use pipeline::PipelineConfig;
pub use pipeline::PipelineOutcome;
pub use variance::identity_variance;

// ============================================================================
// SECTION: Evaluation Context
// ============================================================================

/// Context shared by every DMA evaluating a thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmaContext {
    /// Task the thought reasons about.
    pub task: Task,
    /// Current identity root, when loaded.
    pub identity_root: Option<GraphNode>,
    /// Elevated-exploration flag set by the play state.
    pub exploration: bool,
}

// ============================================================================
// SECTION: Typed Evaluations
// ============================================================================

/// Verdict of the principled (ethical) DMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EthicalDecision {
    /// The thought may proceed.
    Approve,
    /// The thought may proceed with caution noted.
    Flag,
    /// The thought must not proceed.
    Reject,
}

/// Evaluation against ethical principles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthicalEvaluation {
    /// Principled verdict.
    pub decision: EthicalDecision,
    /// Reasoning supporting the verdict.
    pub reasoning: String,
}

/// Plausibility and consistency evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonSenseEvaluation {
    /// Plausibility score in `[0, 1]`.
    pub plausibility_score: f64,
    /// Consistency flags raised during evaluation.
    pub flags: Vec<String>,
    /// Reasoning supporting the score.
    pub reasoning: String,
}

/// Domain-rule alignment evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvaluation {
    /// Named domain the rules belong to.
    pub domain: String,
    /// Alignment score in `[0, 1]`.
    pub alignment_score: f64,
    /// Domain-specific notes.
    pub notes: String,
}

/// Bundle of the three concurrent faculty evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmaEvaluations {
    /// Principled evaluation.
    pub ethical: EthicalEvaluation,
    /// Common-sense evaluation.
    pub common_sense: CommonSenseEvaluation,
    /// Domain-specific evaluation.
    pub domain: DomainEvaluation,
}

// ============================================================================
// SECTION: Selection Context
// ============================================================================

/// Conscience retry context attached to a second selection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRetry {
    /// Action selected on the first attempt.
    pub original: SelectedAction,
    /// Why the conscience asked for reconsideration.
    pub override_reason: String,
    /// Insights accumulated by the conscience faculties.
    pub insights: Vec<EpistemicInsight>,
}

/// Input to the action selection DMA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSelectionContext {
    /// Thought under evaluation.
    pub thought: Thought,
    /// The three faculty evaluations.
    pub evaluations: DmaEvaluations,
    /// Present exactly on the single conscience-driven retry.
    pub retry: Option<SelectionRetry>,
    /// Elevated-exploration flag set by the play state.
    pub exploration: bool,
}

// ============================================================================
// SECTION: DMA Traits
// ============================================================================

/// Principled DMA evaluating a thought against ethical principles.
#[async_trait]
pub trait EthicalDma: Send + Sync {
    /// Evaluates the thought.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when evaluation fails; transient failures are
    /// retried by the pipeline.
    async fn evaluate(
        &self,
        thought: &Thought,
        context: &DmaContext,
    ) -> Result<EthicalEvaluation, ServiceError>;
}

/// Common-sense DMA scoring plausibility and consistency.
#[async_trait]
pub trait CommonSenseDma: Send + Sync {
    /// Evaluates the thought.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when evaluation fails; transient failures are
    /// retried by the pipeline.
    async fn evaluate(
        &self,
        thought: &Thought,
        context: &DmaContext,
    ) -> Result<CommonSenseEvaluation, ServiceError>;
}

/// Domain-specific DMA evaluating alignment with named domain rules.
#[async_trait]
pub trait DomainDma: Send + Sync {
    /// Evaluates the thought.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when evaluation fails; transient failures are
    /// retried by the pipeline.
    async fn evaluate(
        &self,
        thought: &Thought,
        context: &DmaContext,
    ) -> Result<DomainEvaluation, ServiceError>;
}

/// Selection DMA choosing exactly one action from the closed set.
#[async_trait]
pub trait ActionSelectionDma: Send + Sync {
    /// Selects an action given the three faculty evaluations.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when selection fails; transient failures are
    /// retried by the pipeline.
    async fn select(
        &self,
        context: &ActionSelectionContext,
    ) -> Result<SelectedAction, ServiceError>;
}
