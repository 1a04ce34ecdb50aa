// ciris-runtime/tests/happy_path.rs
// ============================================================================
// Module: Happy Path Scenario
// Description: Submit a message, speak once, complete the task, verify audit.
// ============================================================================
//! ## Overview
//! Drives a message through ingress, evaluation, speak, and completion, then
//! checks the audit trail end to end.

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

use ciris_core::ActionKind;
use ciris_core::AuditEventType;
use ciris_core::TaskStatus;
use ciris_core::TaskStore;
use ciris_core::ThoughtStore;
use helpers::HarnessOptions;
use helpers::build_harness;

// ============================================================================
// SECTION: Scenario
// ============================================================================

/// Tests the full happy path: one speak, one completion, a valid chain.
#[tokio::test]
async fn test_happy_path() {
    let harness = build_harness(HarnessOptions::default());
    let task_id = harness.submit("hello");

    // Round one speaks and seeds the confirmation follow-up; round two
    // completes the task.
    assert_eq!(harness.step().await, 1);
    assert_eq!(harness.step().await, 1);

    let sends = harness.comm.recorded();
    assert_eq!(sends.len(), 1, "exactly one speak");
    assert_eq!(sends[0].0.as_str(), "c1");
    assert!(!sends[0].1.is_empty(), "reply is non-empty");

    let task = harness.store.get_task(&task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.outcome.is_some(), "completed tasks carry an outcome");
    assert!(task.signature.is_some(), "completed tasks are signed");

    let events = harness.audit_event_types();
    for expected in [
        AuditEventType::TaskCreated,
        AuditEventType::ThoughtCreated,
        AuditEventType::DmaCompleted,
        AuditEventType::ActionSpeak,
        AuditEventType::ActionTaskComplete,
    ] {
        assert!(events.contains(&expected), "missing audit event {expected}");
    }

    assert!(harness.audit.verify_all().unwrap().is_valid());
}

/// Tests that every executed action carries exactly one audit event.
#[tokio::test]
async fn test_one_audit_event_per_action() {
    let harness = build_harness(HarnessOptions::default());
    harness.submit("hello");
    harness.step().await;
    harness.step().await;

    let events = harness.audit_event_types();
    let speaks = events.iter().filter(|event| **event == AuditEventType::ActionSpeak).count();
    let completions = events
        .iter()
        .filter(|event| **event == AuditEventType::ActionTaskComplete)
        .count();
    assert_eq!(speaks, 1);
    assert_eq!(completions, 1);
}

/// Tests that the seed and follow-up thoughts record their final actions.
#[tokio::test]
async fn test_thoughts_record_final_actions() {
    let harness = build_harness(HarnessOptions::default());
    let task_id = harness.submit("hello");
    harness.step().await;
    harness.step().await;

    let thoughts = harness.store.list_thoughts_for_task(&task_id).unwrap();
    assert_eq!(thoughts.len(), 2);
    let kinds: Vec<ActionKind> = thoughts
        .iter()
        .map(|thought| thought.final_action.as_ref().unwrap().kind())
        .collect();
    assert_eq!(kinds, vec![ActionKind::Speak, ActionKind::TaskComplete]);
    assert_eq!(thoughts[1].round_number, 1);
    assert_eq!(thoughts[1].parent_thought_id.as_ref(), Some(&thoughts[0].thought_id));
}
