// ciris-runtime/tests/control_surface.rs
// ============================================================================
// Module: Control Surface Tests
// Description: Pause, step, resume, queue, and cognitive transitions.
// ============================================================================
//! ## Overview
//! Validates the operator surface: step-while-paused semantics, queue
//! snapshots, and the legality of cognitive state transitions.

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

mod helpers;

use ciris_core::TaskStatus;
use ciris_core::TaskStore;
use ciris_runtime::CognitiveState;
use helpers::HarnessOptions;
use helpers::build_harness;

// ============================================================================
// SECTION: Pause and Step
// ============================================================================

/// Tests that a paused processor still steps exactly one round on demand.
#[tokio::test]
async fn test_pause_step_resume() {
    let harness = build_harness(HarnessOptions::default());
    harness.processor.pause();
    assert!(harness.processor.is_paused());

    let task_id = harness.submit("hello");

    // Step one: the seed thought is processed while paused.
    let processed = harness.step().await;
    assert_eq!(processed, 1);
    let queue = harness.processor.queue_status().unwrap();
    assert_eq!(queue.pending, 1, "the follow-up waits for the next step");

    // Step two completes the task; pause-step-resume equals pause-resume
    // with exactly these units of progress.
    let processed = harness.step().await;
    assert_eq!(processed, 1);
    harness.processor.resume();
    assert!(!harness.processor.is_paused());

    let task = harness.store.get_task(&task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

/// Tests the queue snapshot before any processing.
#[tokio::test]
async fn test_queue_status_empty() {
    let harness = build_harness(HarnessOptions::default());
    let queue = harness.processor.queue_status().unwrap();
    assert_eq!(queue.pending, 0);
    assert_eq!(queue.processing, 0);
}

// ============================================================================
// SECTION: Cognitive Transitions
// ============================================================================

/// Tests the compact transition table.
#[test]
fn test_cognitive_transition_table() {
    assert!(CognitiveState::Shutdown.can_transition_to(CognitiveState::Wakeup));
    assert!(CognitiveState::Wakeup.can_transition_to(CognitiveState::Work));
    assert!(CognitiveState::Work.can_transition_to(CognitiveState::Solitude));
    assert!(CognitiveState::Solitude.can_transition_to(CognitiveState::Work));
    assert!(CognitiveState::Work.can_transition_to(CognitiveState::Dream));
    assert!(CognitiveState::Work.can_transition_to(CognitiveState::Play));
    assert!(CognitiveState::Play.can_transition_to(CognitiveState::Work));

    // Any state may shut down on a signal.
    for state in [
        CognitiveState::Shutdown,
        CognitiveState::Wakeup,
        CognitiveState::Work,
        CognitiveState::Play,
        CognitiveState::Solitude,
        CognitiveState::Dream,
    ] {
        assert!(state.can_transition_to(CognitiveState::Shutdown));
    }

    assert!(!CognitiveState::Shutdown.can_transition_to(CognitiveState::Work));
    assert!(!CognitiveState::Wakeup.can_transition_to(CognitiveState::Play));
    assert!(!CognitiveState::Solitude.can_transition_to(CognitiveState::Dream));
    assert!(!CognitiveState::Dream.can_transition_to(CognitiveState::Play));
}

/// Tests that illegal processor transitions are refused and audited ones
/// succeed.
#[tokio::test]
async fn test_processor_transition_enforcement() {
    let harness = build_harness(HarnessOptions::default());
    assert_eq!(harness.processor.state(), CognitiveState::Shutdown);

    assert!(harness.processor.transition(CognitiveState::Work).is_err());
    harness.processor.transition(CognitiveState::Wakeup).unwrap();
    harness.processor.transition(CognitiveState::Work).unwrap();
    harness.processor.transition(CognitiveState::Play).unwrap();
    assert_eq!(harness.processor.state(), CognitiveState::Play);
    assert!(harness.processor.transition(CognitiveState::Dream).is_err());
}
