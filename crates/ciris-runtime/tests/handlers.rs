// ciris-runtime/tests/handlers.rs
// ============================================================================
// Module: Handler Tests
// Description: Direct dispatcher tests for memory and identity guarding.
// ============================================================================
//! ## Overview
//! Drives the dispatcher directly: memorize-then-recall round-trips through
//! the memory bus, identity writes without an authority signature are
//! blocked as security violations, and deferrals park the task.

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

use ciris_core::ActionParams;
use ciris_core::AuditEventType;
use ciris_core::Clock;
use ciris_core::DeferParams;
use ciris_core::ErrorClass;
use ciris_core::GraphNode;
use ciris_core::GraphScope;
use ciris_core::MemorizeParams;
use ciris_core::NodeId;
use ciris_core::NodeType;
use ciris_core::RecallParams;
use ciris_core::SelectedAction;
use ciris_core::Task;
use ciris_core::TaskContext;
use ciris_core::TaskId;
use ciris_core::TaskStatus;
use ciris_core::TaskStore;
use ciris_core::Thought;
use ciris_core::ThoughtContext;
use ciris_core::ThoughtId;
use ciris_core::ThoughtStatus;
use ciris_core::ThoughtStore;
use helpers::Harness;
use helpers::HarnessOptions;
use helpers::build_harness;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates an active task with a processing thought, ready for dispatch.
fn seed_processing_thought(harness: &Harness, suffix: &str) -> Thought {
    let now = harness.clock.now();
    let task_id = TaskId::new(format!("task-{suffix}"));
    let task = Task::new(task_id.clone(), "manage memory", 0, TaskContext::default(), now);
    harness.store.add_task(&task).unwrap();
    harness.store.update_task_status(&task_id, TaskStatus::Active, None, now).unwrap();

    let mut thought = Thought::seed(
        ThoughtId::new(format!("thought-{suffix}")),
        task_id,
        "decide what to remember",
        ThoughtContext::default(),
        now,
    );
    thought.status = ThoughtStatus::Processing;
    harness.store.add_thought(&thought).unwrap();
    harness
        .store
        .update_thought_status(&thought.thought_id, ThoughtStatus::Processing, None, now)
        .unwrap();
    thought
}

// ============================================================================
// SECTION: Memorize and Recall
// ============================================================================

/// Tests that a memorized node recalls intact.
#[tokio::test]
async fn test_memorize_recall_round_trip() {
    let harness = build_harness(HarnessOptions::default());
    let node = GraphNode::new(
        NodeId::new("concept/tea"),
        NodeType::Concept,
        GraphScope::Local,
        json!({"notes": "the user prefers green tea"}),
    );

    let memorize_thought = seed_processing_thought(&harness, "m");
    harness
        .dispatcher
        .dispatch(
            &harness.ctx,
            &memorize_thought,
            &SelectedAction::new(
                ActionParams::Memorize(MemorizeParams {
                    node: node.clone(),
                    authority_signature: None,
                }),
                "remember the stated preference",
            ),
        )
        .await
        .unwrap();

    let recall_thought = seed_processing_thought(&harness, "r");
    harness
        .dispatcher
        .dispatch(
            &harness.ctx,
            &recall_thought,
            &SelectedAction::new(
                ActionParams::Recall(RecallParams {
                    node_id: NodeId::new("concept/tea"),
                    scope: GraphScope::Local,
                }),
                "look up the stated preference",
            ),
        )
        .await
        .unwrap();

    let children = harness.store.get_child_thoughts(&recall_thought.thought_id).unwrap();
    assert_eq!(children.len(), 1);
    let recalled = &children[0].context.tool_results[0]["recalled"];
    assert_eq!(recalled["attributes"], node.attributes, "round-trips modulo secret refs");

    let events = harness.audit_event_types();
    assert!(events.contains(&AuditEventType::ActionMemorize));
    assert!(events.contains(&AuditEventType::ActionRecall));
}

// ============================================================================
// SECTION: Identity Guarding
// ============================================================================

/// Tests that an unsigned identity write is blocked and audited.
#[tokio::test]
async fn test_identity_write_without_signature_blocked() {
    let harness = build_harness(HarnessOptions::default());
    let thought = seed_processing_thought(&harness, "i");

    let result = harness
        .dispatcher
        .dispatch(
            &harness.ctx,
            &thought,
            &SelectedAction::new(
                ActionParams::Memorize(MemorizeParams {
                    node: GraphNode::new(
                        NodeId::new("agent/identity"),
                        NodeType::Identity,
                        GraphScope::Identity,
                        json!({"name": "ciris"}),
                    ),
                    authority_signature: None,
                }),
                "update the identity root",
            ),
        )
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.class, ErrorClass::SecurityViolation);

    let loaded = harness.store.get_thought(&thought.thought_id).unwrap().unwrap();
    assert_eq!(loaded.status, ThoughtStatus::Failed);
    assert!(harness.store.get_child_thoughts(&thought.thought_id).unwrap().is_empty());

    let events = harness.audit_event_types();
    assert!(events.contains(&AuditEventType::SecurityViolation));
}

// ============================================================================
// SECTION: Deferral
// ============================================================================

/// Tests that a deferral parks the task and schedules the retrigger.
#[tokio::test]
async fn test_defer_parks_task_and_schedules_retrigger() {
    let harness = build_harness(HarnessOptions::default());
    let thought = seed_processing_thought(&harness, "d");
    let defer_until = harness.clock.now().saturating_add_millis(60_000);

    harness
        .dispatcher
        .dispatch(
            &harness.ctx,
            &thought,
            &SelectedAction::new(
                ActionParams::Defer(DeferParams {
                    reason: "needs human judgment".to_string(),
                    defer_until: Some(defer_until),
                }),
                "this decision needs a wise authority",
            ),
        )
        .await
        .unwrap();

    let task = harness.store.get_task(&thought.source_task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Deferred);

    let loaded = harness.store.get_thought(&thought.thought_id).unwrap().unwrap();
    assert_eq!(loaded.status, ThoughtStatus::Deferred);

    use ciris_core::ScheduledTaskStore;
    let due = harness.store.due_scheduled(defer_until, 0).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].origin_thought_id.as_ref(), Some(&thought.thought_id));
}
