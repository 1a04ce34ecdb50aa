// ciris-core/src/dma/conscience.rs
// ============================================================================
// Module: CIRIS Conscience
// Description: Epistemic faculties re-evaluating a selected action.
// Purpose: Veto or reconsider actions that fail entropy, coherence, or
//          humility checks before any handler executes them.
// Dependencies: async-trait, serde, crate::core
// ============================================================================

//! ## Overview
//! After the selection DMA picks an action, the conscience runs its faculties
//! over the proposal. Each faculty produces a score plus an insight; any
//! faculty may request reconsideration, which triggers exactly one guided
//! retry of the selection. The built-in faculties are deterministic text
//! statistics; deployments may swap in model-backed faculties through the
//! same trait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::core::ActionKind;
use crate::core::ActionParams;
use crate::core::GraphScope;
use crate::core::SelectedAction;
use crate::core::ServiceError;
use crate::core::Thought;
use crate::core::thought::EpistemicInsight;

// ============================================================================
// SECTION: Thresholds
// ============================================================================

/// Default maximum entropy score before reconsideration.
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 0.40;
/// Default minimum coherence score before reconsideration.
pub const DEFAULT_COHERENCE_THRESHOLD: f64 = 0.60;

/// Configurable conscience thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConscienceThresholds {
    /// Entropy scores above this value request reconsideration.
    pub entropy_max: f64,
    /// Coherence scores below this value request reconsideration.
    pub coherence_min: f64,
}

impl Default for ConscienceThresholds {
    fn default() -> Self {
        Self {
            entropy_max: DEFAULT_ENTROPY_THRESHOLD,
            coherence_min: DEFAULT_COHERENCE_THRESHOLD,
        }
    }
}

// ============================================================================
// SECTION: Faculty Contract
// ============================================================================

/// Report produced by one conscience faculty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacultyReport {
    /// Faculty name.
    pub faculty: String,
    /// Faculty score in `[0, 1]`.
    pub score: f64,
    /// Whether the faculty requests reconsideration.
    pub reconsider: bool,
    /// Insight explaining the score.
    pub insight: String,
}

/// Epistemic faculty re-evaluating a proposed action.
#[async_trait]
pub trait ConscienceFaculty: Send + Sync {
    /// Returns the faculty name used in epistemic data.
    fn name(&self) -> &'static str;

    /// Reviews the proposed action for the given thought.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the faculty cannot evaluate; an erroring
    /// faculty never forces reconsideration.
    async fn review(
        &self,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<FacultyReport, ServiceError>;
}

// ============================================================================
// SECTION: Conscience Result
// ============================================================================

/// Aggregate verdict of all conscience faculties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConscienceResult {
    /// True when any faculty requested reconsideration.
    pub overridden: bool,
    /// Aggregated reconsideration reason, when overridden.
    pub override_reason: Option<String>,
    /// Insights from every faculty that reported.
    pub epistemic_data: Vec<EpistemicInsight>,
}

// ============================================================================
// SECTION: Conscience Aggregator
// ============================================================================

/// The set of epistemic faculties applied to every selected action.
pub struct Conscience {
    /// Faculties in review order.
    faculties: Vec<Arc<dyn ConscienceFaculty>>,
}

impl Conscience {
    /// Creates a conscience from explicit faculties.
    #[must_use]
    pub const fn new(faculties: Vec<Arc<dyn ConscienceFaculty>>) -> Self {
        Self {
            faculties,
        }
    }

    /// Creates a conscience with the four built-in faculties.
    #[must_use]
    pub fn with_default_faculties(thresholds: ConscienceThresholds) -> Self {
        Self::new(vec![
            Arc::new(EntropyFaculty::new(thresholds.entropy_max)),
            Arc::new(CoherenceFaculty::new(thresholds.coherence_min)),
            Arc::new(OptimizationVetoFaculty),
            Arc::new(EpistemicHumilityFaculty),
        ])
    }

    /// Reviews a proposed action with every faculty.
    pub async fn review(&self, thought: &Thought, action: &SelectedAction) -> ConscienceResult {
        let mut epistemic_data = Vec::with_capacity(self.faculties.len());
        let mut reasons = Vec::new();

        for faculty in &self.faculties {
            match faculty.review(thought, action).await {
                Ok(report) => {
                    if report.reconsider {
                        reasons.push(format!("{}: {}", report.faculty, report.insight));
                    }
                    epistemic_data.push(EpistemicInsight {
                        faculty: report.faculty,
                        score: report.score,
                        insight: report.insight,
                    });
                }
                Err(err) => {
                    tracing::warn!(faculty = faculty.name(), error = %err, "faculty unavailable");
                }
            }
        }

        let overridden = !reasons.is_empty();
        ConscienceResult {
            overridden,
            override_reason: overridden.then(|| reasons.join("; ")),
            epistemic_data,
        }
    }
}

// ============================================================================
// SECTION: Built-In Faculties
// ============================================================================

/// Measures disorder of outbound content.
///
/// High scores correlate with garbled or low-signal responses: characters
/// outside the natural-language alphabet and long runs without word breaks.
pub struct EntropyFaculty {
    /// Scores above this value request reconsideration.
    max_score: f64,
}

impl EntropyFaculty {
    /// Creates the faculty with the configured threshold.
    #[must_use]
    pub const fn new(max_score: f64) -> Self {
        Self {
            max_score,
        }
    }
}

#[async_trait]
impl ConscienceFaculty for EntropyFaculty {
    fn name(&self) -> &'static str {
        "entropy"
    }

    async fn review(
        &self,
        _thought: &Thought,
        action: &SelectedAction,
    ) -> Result<FacultyReport, ServiceError> {
        let text = outbound_text(action).unwrap_or(&action.rationale);
        let score = disorder_score(text);
        let reconsider = score > self.max_score;
        Ok(FacultyReport {
            faculty: self.name().to_string(),
            score,
            reconsider,
            insight: if reconsider {
                format!("outbound content entropy {score:.2} exceeds {:.2}", self.max_score)
            } else {
                format!("entropy {score:.2} within bounds")
            },
        })
    }
}

/// Measures lexical grounding of the rationale in the thought content.
///
/// A rationale sharing no vocabulary with the thought it justifies is a sign
/// the selection drifted from the question.
pub struct CoherenceFaculty {
    /// Scores below this value request reconsideration.
    min_score: f64,
}

impl CoherenceFaculty {
    /// Creates the faculty with the configured threshold.
    #[must_use]
    pub const fn new(min_score: f64) -> Self {
        Self {
            min_score,
        }
    }
}

#[async_trait]
impl ConscienceFaculty for CoherenceFaculty {
    fn name(&self) -> &'static str {
        "coherence"
    }

    async fn review(
        &self,
        thought: &Thought,
        action: &SelectedAction,
    ) -> Result<FacultyReport, ServiceError> {
        let score = if action.rationale.trim().is_empty() {
            0.0
        } else {
            0.5 + 0.5 * lexical_overlap(&thought.content, &action.rationale)
        };
        let reconsider = score < self.min_score;
        Ok(FacultyReport {
            faculty: self.name().to_string(),
            score,
            reconsider,
            insight: if reconsider {
                format!("rationale coherence {score:.2} below {:.2}", self.min_score)
            } else {
                format!("coherence {score:.2} within bounds")
            },
        })
    }
}

/// Vetoes irreversible actions justified by thin rationales.
pub struct OptimizationVetoFaculty;

/// Minimum rationale length accepted for irreversible actions.
const MIN_IRREVERSIBLE_RATIONALE_CHARS: usize = 24;

#[async_trait]
impl ConscienceFaculty for OptimizationVetoFaculty {
    fn name(&self) -> &'static str {
        "optimization_veto"
    }

    async fn review(
        &self,
        _thought: &Thought,
        action: &SelectedAction,
    ) -> Result<FacultyReport, ServiceError> {
        let irreversible = match &action.params {
            ActionParams::Forget(params) => params.scope != GraphScope::Local,
            ActionParams::Reject(_) => true,
            _ => false,
        };
        let thin = action.rationale.trim().len() < MIN_IRREVERSIBLE_RATIONALE_CHARS;
        let reconsider = irreversible && thin;
        let score = if reconsider { 1.0 } else { 0.0 };
        Ok(FacultyReport {
            faculty: self.name().to_string(),
            score,
            reconsider,
            insight: if reconsider {
                "irreversible action carries an insufficient rationale".to_string()
            } else {
                "no optimization concern".to_string()
            },
        })
    }
}

/// Flags overconfident external claims lacking any hedge.
pub struct EpistemicHumilityFaculty;

/// Markers of unwarranted certainty in outbound content.
const CERTAINTY_MARKERS: [&str; 5] =
    ["certainly", "definitely", "guaranteed", "impossible", "always"];
/// Markers acknowledging uncertainty.
const HEDGE_MARKERS: [&str; 5] = ["may", "might", "likely", "appears", "uncertain"];

#[async_trait]
impl ConscienceFaculty for EpistemicHumilityFaculty {
    fn name(&self) -> &'static str {
        "epistemic_humility"
    }

    async fn review(
        &self,
        _thought: &Thought,
        action: &SelectedAction,
    ) -> Result<FacultyReport, ServiceError> {
        let external = matches!(action.kind(), ActionKind::Speak | ActionKind::Tool);
        let text = outbound_text(action).unwrap_or(&action.rationale).to_lowercase();
        let certain = CERTAINTY_MARKERS.iter().filter(|marker| text.contains(**marker)).count();
        let hedged = HEDGE_MARKERS.iter().any(|marker| text.contains(*marker));
        let reconsider = external && certain >= 2 && !hedged;
        let score = if certain == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss, reason = "Marker counts are tiny.")]
            {
                (certain as f64 / CERTAINTY_MARKERS.len() as f64).min(1.0)
            }
        };
        Ok(FacultyReport {
            faculty: self.name().to_string(),
            score,
            reconsider,
            insight: if reconsider {
                "outbound claim asserts certainty without acknowledging uncertainty".to_string()
            } else {
                "humility within bounds".to_string()
            },
        })
    }
}

// ============================================================================
// SECTION: Text Statistics
// ============================================================================

/// Returns the outbound text of an action, when it has one.
fn outbound_text(action: &SelectedAction) -> Option<&String> {
    match &action.params {
        ActionParams::Speak(params) => Some(&params.content),
        ActionParams::Observe(params) => Some(&params.summary),
        ActionParams::Reject(params) => Some(&params.reason),
        ActionParams::Defer(params) => Some(&params.reason),
        _ => None,
    }
}

/// Minimum length before a missing word break counts against a text.
const BOUNDARY_CHECK_MIN_CHARS: usize = 40;

/// Estimates content disorder in `[0, 1]`.
///
/// Counts characters outside the natural-language alphabet and penalizes
/// long texts with no word boundaries. Well-formed prose scores near zero.
fn disorder_score(text: &str) -> f64 {
    let mut total = 0usize;
    let mut unusual = 0usize;
    let mut whitespace = 0usize;
    for ch in text.chars() {
        total += 1;
        if ch.is_whitespace() {
            whitespace += 1;
        } else if !ch.is_alphanumeric() && !".,:;!?'\"()-".contains(ch) {
            unusual += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "Character counts are far below 2^52.")]
    let unusual_ratio = unusual as f64 / total as f64;
    let boundary_penalty = if total >= BOUNDARY_CHECK_MIN_CHARS && whitespace == 0 {
        0.5
    } else {
        0.0
    };
    (2.0 * unusual_ratio + boundary_penalty).clamp(0.0, 1.0)
}

/// Computes word overlap between two texts, normalized to `[0, 1]`.
fn lexical_overlap(left: &str, right: &str) -> f64 {
    let left_words: BTreeSet<String> = left.split_whitespace().map(str::to_lowercase).collect();
    let right_words: BTreeSet<String> = right.split_whitespace().map(str::to_lowercase).collect();
    if right_words.is_empty() {
        return 0.0;
    }
    let shared = right_words.iter().filter(|word| left_words.contains(*word)).count();
    #[allow(clippy::cast_precision_loss, reason = "Word counts are far below 2^52.")]
    {
        shared as f64 / right_words.len() as f64
    }
}
