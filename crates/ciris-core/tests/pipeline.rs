// ciris-core/tests/pipeline.rs
// ============================================================================
// Module: Pipeline Tests
// Description: Tests for layered evaluation, guards, and conscience retry.
// ============================================================================
//! ## Overview
//! Validates depth-cap forcing, deferral synthesis on DMA failure, the
//! single conscience-driven retry, and the identity variance guard using
//! deterministic stub DMAs.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use ciris_core::ActionKind;
use ciris_core::ActionParams;
use ciris_core::ChannelId;
use ciris_core::Conscience;
use ciris_core::ConscienceFaculty;
use ciris_core::DmaContext;
use ciris_core::DmaPipeline;
use ciris_core::FacultyReport;
use ciris_core::GraphNode;
use ciris_core::GraphScope;
use ciris_core::MemorizeParams;
use ciris_core::NodeId;
use ciris_core::NodeType;
use ciris_core::PipelineConfig;
use ciris_core::SelectedAction;
use ciris_core::ServiceError;
use ciris_core::SpeakParams;
use ciris_core::Task;
use ciris_core::TaskContext;
use ciris_core::TaskId;
use ciris_core::Thought;
use ciris_core::ThoughtContext;
use ciris_core::ThoughtId;
use ciris_core::Timestamp;
use ciris_core::dma::ActionSelectionContext;
use ciris_core::dma::ActionSelectionDma;
use ciris_core::dma::CommonSenseDma;
use ciris_core::dma::CommonSenseEvaluation;
use ciris_core::dma::DomainDma;
use ciris_core::dma::DomainEvaluation;
use ciris_core::dma::EthicalDma;
use ciris_core::dma::EthicalDecision;
use ciris_core::dma::EthicalEvaluation;

// ============================================================================
// SECTION: Stub DMAs
// ============================================================================

/// Ethical stub approving everything, counting invocations.
struct StubEthical {
    /// Invocation counter.
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EthicalDma for StubEthical {
    async fn evaluate(
        &self,
        _thought: &Thought,
        _context: &DmaContext,
    ) -> Result<EthicalEvaluation, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EthicalEvaluation {
            decision: EthicalDecision::Approve,
            reasoning: "no ethical concern".to_string(),
        })
    }
}

/// Common-sense stub scoring everything plausible.
struct StubCommonSense;

#[async_trait]
impl CommonSenseDma for StubCommonSense {
    async fn evaluate(
        &self,
        _thought: &Thought,
        _context: &DmaContext,
    ) -> Result<CommonSenseEvaluation, ServiceError> {
        Ok(CommonSenseEvaluation {
            plausibility_score: 0.95,
            flags: Vec::new(),
            reasoning: "plausible".to_string(),
        })
    }
}

/// Domain stub aligned with everything.
struct StubDomain;

#[async_trait]
impl DomainDma for StubDomain {
    async fn evaluate(
        &self,
        _thought: &Thought,
        _context: &DmaContext,
    ) -> Result<DomainEvaluation, ServiceError> {
        Ok(DomainEvaluation {
            domain: "general".to_string(),
            alignment_score: 0.9,
            notes: "aligned".to_string(),
        })
    }
}

/// Ethical stub failing with a non-retryable error.
struct FailingEthical;

#[async_trait]
impl EthicalDma for FailingEthical {
    async fn evaluate(
        &self,
        _thought: &Thought,
        _context: &DmaContext,
    ) -> Result<EthicalEvaluation, ServiceError> {
        Err(ServiceError::validation("evaluator misconfigured"))
    }
}

/// Selection stub returning a fixed action, counting invocations.
struct FixedSelection {
    /// Action returned on every call.
    action: SelectedAction,
    /// Invocation counter.
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ActionSelectionDma for FixedSelection {
    async fn select(
        &self,
        _context: &ActionSelectionContext,
    ) -> Result<SelectedAction, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.action.clone())
    }
}

/// Faculty that always requests reconsideration.
struct AlwaysOverride;

#[async_trait]
impl ConscienceFaculty for AlwaysOverride {
    fn name(&self) -> &'static str {
        "always_override"
    }

    async fn review(
        &self,
        _thought: &Thought,
        _action: &SelectedAction,
    ) -> Result<FacultyReport, ServiceError> {
        Ok(FacultyReport {
            faculty: "always_override".to_string(),
            score: 1.0,
            reconsider: true,
            insight: "reconsider this selection".to_string(),
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a thought at the given round.
fn thought_at_round(round: u32) -> Thought {
    let mut thought = Thought::seed(
        ThoughtId::new("thought-1"),
        TaskId::new("task-1"),
        "greet the user warmly",
        ThoughtContext::default(),
        Timestamp::from_unix_millis(0),
    );
    thought.round_number = round;
    thought
}

/// Builds the shared evaluation context.
fn context() -> DmaContext {
    DmaContext {
        task: Task::new(
            TaskId::new("task-1"),
            "greet the user warmly",
            0,
            TaskContext::default(),
            Timestamp::from_unix_millis(0),
        ),
        identity_root: None,
        exploration: false,
    }
}

/// Builds a speak action echoing the thought content.
fn speak_action() -> SelectedAction {
    SelectedAction::new(
        ActionParams::Speak(SpeakParams {
            channel_id: ChannelId::new("c1"),
            content: "Hello! Happy to help.".to_string(),
        }),
        "greet the user warmly as the task asks",
    )
}

/// Builds a pipeline from parts with an empty conscience.
fn pipeline_with(
    ethical: Arc<dyn EthicalDma>,
    selection: Arc<dyn ActionSelectionDma>,
    conscience: Conscience,
    config: PipelineConfig,
) -> DmaPipeline {
    DmaPipeline::new(
        ethical,
        Arc::new(StubCommonSense),
        Arc::new(StubDomain),
        selection,
        conscience,
        config,
    )
}

// ============================================================================
// SECTION: Depth Guard
// ============================================================================

/// Tests that a thought at the depth cap completes without invoking DMAs.
#[tokio::test]
async fn test_depth_cap_skips_dmas() {
    let dma_calls = Arc::new(AtomicUsize::new(0));
    let selection_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(
        Arc::new(StubEthical {
            calls: Arc::clone(&dma_calls),
        }),
        Arc::new(FixedSelection {
            action: speak_action(),
            calls: Arc::clone(&selection_calls),
        }),
        Conscience::new(Vec::new()),
        PipelineConfig {
            max_thought_depth: 2,
            ..PipelineConfig::default()
        },
    );

    let outcome = pipeline.evaluate(&thought_at_round(2), &context()).await;
    assert_eq!(outcome.action.kind(), ActionKind::TaskComplete);
    let ActionParams::TaskComplete(params) = &outcome.action.params else {
        panic!("expected task completion");
    };
    assert_eq!(params.outcome.status, "depth-cap");
    assert_eq!(dma_calls.load(Ordering::SeqCst), 0);
    assert_eq!(selection_calls.load(Ordering::SeqCst), 0);
    assert!(outcome.conscience.is_none());
}

// ============================================================================
// SECTION: Failure Synthesis
// ============================================================================

/// Tests that a definitive DMA failure synthesizes a deferral.
#[tokio::test]
async fn test_dma_failure_synthesizes_defer() {
    let selection_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(
        Arc::new(FailingEthical),
        Arc::new(FixedSelection {
            action: speak_action(),
            calls: Arc::clone(&selection_calls),
        }),
        Conscience::new(Vec::new()),
        PipelineConfig::default(),
    );

    let outcome = pipeline.evaluate(&thought_at_round(0), &context()).await;
    assert_eq!(outcome.action.kind(), ActionKind::Defer);
    let ActionParams::Defer(params) = &outcome.action.params else {
        panic!("expected deferral");
    };
    assert!(params.reason.contains("dma evaluation failed"));
    assert_eq!(selection_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// SECTION: Conscience Retry
// ============================================================================

/// Tests that an override triggers exactly one guided retry.
#[tokio::test]
async fn test_conscience_retry_happens_once() {
    let selection_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(
        Arc::new(StubEthical {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(FixedSelection {
            action: speak_action(),
            calls: Arc::clone(&selection_calls),
        }),
        Conscience::new(vec![Arc::new(AlwaysOverride)]),
        PipelineConfig::default(),
    );

    let outcome = pipeline.evaluate(&thought_at_round(0), &context()).await;
    // The second selection stands even though the faculty still disagrees.
    assert_eq!(selection_calls.load(Ordering::SeqCst), 2);
    assert!(outcome.retried);
    assert!(outcome.final_disagreement);
    let conscience = outcome.conscience.unwrap();
    assert!(conscience.overridden);
    assert!(conscience.override_reason.unwrap().contains("always_override"));
    assert_eq!(outcome.action.kind(), ActionKind::Speak);
    // Insights from both reviews accumulate for the thought's children.
    assert_eq!(outcome.epistemic_data.len(), 2);
}

/// Tests that a clean review selects once and records no retry.
#[tokio::test]
async fn test_no_override_selects_once() {
    let selection_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(
        Arc::new(StubEthical {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(FixedSelection {
            action: speak_action(),
            calls: Arc::clone(&selection_calls),
        }),
        Conscience::new(Vec::new()),
        PipelineConfig::default(),
    );

    let outcome = pipeline.evaluate(&thought_at_round(0), &context()).await;
    assert_eq!(selection_calls.load(Ordering::SeqCst), 1);
    assert!(!outcome.retried);
    assert!(!outcome.final_disagreement);
}

// ============================================================================
// SECTION: Identity Guard
// ============================================================================

/// Tests that an out-of-bounds identity write is forced through defer.
#[tokio::test]
async fn test_identity_variance_guard_defers() {
    let memorize = SelectedAction::new(
        ActionParams::Memorize(MemorizeParams {
            node: GraphNode::new(
                NodeId::new("agent/identity"),
                NodeType::Identity,
                GraphScope::Identity,
                serde_json::json!({"name": "someone else", "purpose": "different"}),
            ),
            authority_signature: Some("signed".to_string()),
        }),
        "rewrite the identity root entirely",
    );
    let pipeline = pipeline_with(
        Arc::new(StubEthical {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(FixedSelection {
            action: memorize,
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Conscience::new(Vec::new()),
        PipelineConfig::default(),
    );

    let mut ctx = context();
    ctx.identity_root = Some(GraphNode::new(
        NodeId::new("agent/identity"),
        NodeType::Identity,
        GraphScope::Identity,
        serde_json::json!({"name": "ciris", "purpose": "moral-reasoning agent"}),
    ));

    let outcome = pipeline.evaluate(&thought_at_round(0), &ctx).await;
    assert_eq!(outcome.action.kind(), ActionKind::Defer);
    let ActionParams::Defer(params) = &outcome.action.params else {
        panic!("expected deferral");
    };
    assert!(params.reason.contains("variance"));
}

/// Tests that a small identity adjustment passes the guard.
#[tokio::test]
async fn test_identity_small_change_passes() {
    let memorize = SelectedAction::new(
        ActionParams::Memorize(MemorizeParams {
            node: GraphNode::new(
                NodeId::new("agent/identity"),
                NodeType::Identity,
                GraphScope::Identity,
                serde_json::json!({
                    "name": "ciris",
                    "purpose": "moral-reasoning agent",
                    "a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6, "g": 7,
                }),
            ),
            authority_signature: Some("signed".to_string()),
        }),
        "record one refined trait on the identity root",
    );
    let pipeline = pipeline_with(
        Arc::new(StubEthical {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(FixedSelection {
            action: memorize,
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Conscience::new(Vec::new()),
        PipelineConfig::default(),
    );

    let mut ctx = context();
    ctx.identity_root = Some(GraphNode::new(
        NodeId::new("agent/identity"),
        NodeType::Identity,
        GraphScope::Identity,
        serde_json::json!({
            "name": "ciris",
            "purpose": "moral-reasoning agent",
            "a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6, "g": 0,
        }),
    ));

    let outcome = pipeline.evaluate(&thought_at_round(0), &ctx).await;
    assert_eq!(outcome.action.kind(), ActionKind::Memorize);
}
