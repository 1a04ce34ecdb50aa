// ciris-core/src/dma/pipeline.rs
// ============================================================================
// Module: CIRIS DMA Pipeline
// Description: Layered evaluation of a thought with conscience re-check.
// Purpose: Turn one thought into exactly one guarded, reviewed action.
// Dependencies: tokio, crate::core, crate::dma
// ============================================================================

//! ## Overview
//! The pipeline is the single canonical evaluation path for a thought. It runs
//! the three faculty DMAs concurrently under a deadline, feeds their results
//! to the selection DMA, re-checks the proposal with the conscience, performs
//! at most one guided selection retry, and applies the hard guards (thought
//! depth, identity variance) that no DMA may bypass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ActionParams;
use crate::core::GraphScope;
use crate::core::SelectedAction;
use crate::core::ServiceError;
use crate::core::Thought;
use crate::core::thought::DEFAULT_MAX_THOUGHT_DEPTH;
use crate::core::thought::EpistemicInsight;
use crate::dma::ActionSelectionContext;
use crate::dma::ActionSelectionDma;
use crate::dma::CommonSenseDma;
use crate::dma::DmaContext;
use crate::dma::DmaEvaluations;
use crate::dma::DomainDma;
use crate::dma::EthicalDma;
use crate::dma::SelectionRetry;
use crate::dma::conscience::Conscience;
use crate::dma::conscience::ConscienceResult;
use crate::dma::variance::DEFAULT_IDENTITY_VARIANCE_THRESHOLD;
use crate::dma::variance::identity_variance;

// ============================================================================
// SECTION: Pipeline Configuration
// ============================================================================

/// Default per-DMA evaluation deadline in seconds.
pub const DEFAULT_DMA_TIMEOUT_SECONDS: f64 = 30.0;
/// Default retry limit for retryable DMA failures.
pub const DEFAULT_DMA_RETRY_LIMIT: u32 = 3;

/// Configuration for the DMA pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Follow-up depth cap; thoughts past it complete without evaluation.
    pub max_thought_depth: u32,
    /// Per-DMA evaluation deadline.
    pub dma_timeout: Duration,
    /// Retry limit for retryable DMA failures.
    pub dma_retry_limit: u32,
    /// Identity writes above this variance are forced through defer.
    pub identity_variance_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_thought_depth: DEFAULT_MAX_THOUGHT_DEPTH,
            dma_timeout: Duration::from_secs_f64(DEFAULT_DMA_TIMEOUT_SECONDS),
            dma_retry_limit: DEFAULT_DMA_RETRY_LIMIT,
            identity_variance_threshold: DEFAULT_IDENTITY_VARIANCE_THRESHOLD,
        }
    }
}

// ============================================================================
// SECTION: Pipeline Outcome
// ============================================================================

/// Result of one pipeline evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Final action after conscience review and hard guards.
    pub action: SelectedAction,
    /// Conscience verdict for the final action, when DMAs ran.
    pub conscience: Option<ConscienceResult>,
    /// True when the conscience forced a selection retry.
    pub retried: bool,
    /// True when the conscience disagreed with the retried action as well.
    pub final_disagreement: bool,
    /// Insights to attach to the thought context for its children.
    pub epistemic_data: Vec<EpistemicInsight>,
    /// Faculty evaluations, when DMAs ran.
    pub evaluations: Option<DmaEvaluations>,
}

impl PipelineOutcome {
    /// Builds an outcome for a guard-forced action that skipped the DMAs.
    fn forced(action: SelectedAction) -> Self {
        Self {
            action,
            conscience: None,
            retried: false,
            final_disagreement: false,
            epistemic_data: Vec::new(),
            evaluations: None,
        }
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Layered DMA evaluation engine.
pub struct DmaPipeline {
    /// Principled DMA.
    ethical: Arc<dyn EthicalDma>,
    /// Common-sense DMA.
    common_sense: Arc<dyn CommonSenseDma>,
    /// Domain-specific DMA.
    domain: Arc<dyn DomainDma>,
    /// Action selection DMA.
    selection: Arc<dyn ActionSelectionDma>,
    /// Conscience faculties.
    conscience: Conscience,
    /// Pipeline configuration.
    config: PipelineConfig,
}

impl DmaPipeline {
    /// Creates a pipeline from its DMAs and conscience.
    #[must_use]
    pub const fn new(
        ethical: Arc<dyn EthicalDma>,
        common_sense: Arc<dyn CommonSenseDma>,
        domain: Arc<dyn DomainDma>,
        selection: Arc<dyn ActionSelectionDma>,
        conscience: Conscience,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ethical,
            common_sense,
            domain,
            selection,
            conscience,
            config,
        }
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Evaluates one thought into a final guarded action.
    ///
    /// Failures never escape: definitive DMA failures synthesize a deferral
    /// and hard guards rewrite disallowed actions in place.
    pub async fn evaluate(&self, thought: &Thought, context: &DmaContext) -> PipelineOutcome {
        if thought.round_number >= self.config.max_thought_depth {
            tracing::info!(
                thought_id = %thought.thought_id,
                round = thought.round_number,
                "depth cap reached, forcing task completion"
            );
            return PipelineOutcome::forced(SelectedAction::depth_cap_completion());
        }

        let evaluations = match self.run_faculty_dmas(thought, context).await {
            Ok(evaluations) => evaluations,
            Err(err) => {
                tracing::warn!(thought_id = %thought.thought_id, error = %err, "dma failed");
                return PipelineOutcome::forced(SelectedAction::synthesized_defer(format!(
                    "dma evaluation failed: {err}"
                )));
            }
        };

        let mut selection_context = ActionSelectionContext {
            thought: thought.clone(),
            evaluations: evaluations.clone(),
            retry: None,
            exploration: context.exploration,
        };

        let first = match self.run_selection(&selection_context).await {
            Ok(action) => action,
            Err(err) => {
                return PipelineOutcome::forced(SelectedAction::synthesized_defer(format!(
                    "action selection failed: {err}"
                )));
            }
        };

        let review = self.conscience.review(thought, &first).await;
        let mut epistemic_data = review.epistemic_data.clone();

        let (action, conscience, retried, final_disagreement) = if review.overridden {
            let reason = review.override_reason.clone().unwrap_or_default();
            selection_context.retry = Some(SelectionRetry {
                original: first.clone(),
                override_reason: reason,
                insights: epistemic_data.clone(),
            });

            // The second result stands even if the conscience disagrees again;
            // the disagreement is recorded, never acted on.
            match self.run_selection(&selection_context).await {
                Ok(second) => {
                    let second_review = self.conscience.review(thought, &second).await;
                    epistemic_data.extend(second_review.epistemic_data.clone());
                    let disagreed = second_review.overridden;
                    (second, review, true, disagreed)
                }
                Err(err) => {
                    let action = SelectedAction::synthesized_defer(format!(
                        "action selection retry failed: {err}"
                    ));
                    (action, review, true, false)
                }
            }
        } else {
            (first, review, false, false)
        };

        let action = self.apply_identity_guard(action, context);

        PipelineOutcome {
            action,
            conscience: Some(conscience),
            retried,
            final_disagreement,
            epistemic_data,
            evaluations: Some(evaluations),
        }
    }

    /// Runs the three faculty DMAs concurrently under the deadline.
    async fn run_faculty_dmas(
        &self,
        thought: &Thought,
        context: &DmaContext,
    ) -> Result<DmaEvaluations, ServiceError> {
        let config = self.config;
        let (ethical, common_sense, domain) = tokio::join!(
            with_retry("pdma", config, || self.ethical.evaluate(thought, context)),
            with_retry("csdma", config, || self.common_sense.evaluate(thought, context)),
            with_retry("dsdma", config, || self.domain.evaluate(thought, context)),
        );
        Ok(DmaEvaluations {
            ethical: ethical?,
            common_sense: common_sense?,
            domain: domain?,
        })
    }

    /// Runs the selection DMA under the deadline with retries.
    async fn run_selection(
        &self,
        context: &ActionSelectionContext,
    ) -> Result<SelectedAction, ServiceError> {
        with_retry("action_selection", self.config, || self.selection.select(context)).await
    }

    /// Forces identity-scope writes above the variance threshold through defer.
    fn apply_identity_guard(
        &self,
        action: SelectedAction,
        context: &DmaContext,
    ) -> SelectedAction {
        let proposed = match &action.params {
            ActionParams::Memorize(params) if params.node.scope == GraphScope::Identity => {
                Some(params.node.attributes.clone())
            }
            ActionParams::Forget(params) if params.scope == GraphScope::Identity => {
                Some(serde_json::Value::Object(serde_json::Map::new()))
            }
            _ => None,
        };
        let Some(proposed) = proposed else {
            return action;
        };

        let current = context
            .identity_root
            .as_ref()
            .map_or_else(|| serde_json::Value::Object(serde_json::Map::new()), |node| {
                node.attributes.clone()
            });
        let variance = identity_variance(&current, &proposed);
        if variance <= self.config.identity_variance_threshold {
            return action;
        }

        tracing::warn!(
            variance,
            threshold = self.config.identity_variance_threshold,
            "identity write exceeds variance threshold, deferring"
        );
        SelectedAction::synthesized_defer(format!(
            "identity change variance {variance:.2} exceeds threshold {:.2}",
            self.config.identity_variance_threshold
        ))
    }
}

// ============================================================================
// SECTION: Retry Helper
// ============================================================================

/// Runs a DMA call under the deadline, retrying retryable failures.
///
/// A deadline expiry counts as a retryable failure, equivalent to a
/// cancelled sub-evaluation.
async fn with_retry<T, Fut, F>(
    label: &str,
    config: PipelineConfig,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let error = match tokio::time::timeout(config.dma_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error,
            Err(_) => ServiceError::transient(format!("{label} deadline exceeded")),
        };
        if !error.class.is_retryable() || attempt >= config.dma_retry_limit {
            return Err(error);
        }
        tracing::debug!(dma = label, attempt, error = %error, "retrying dma evaluation");
    }
}
