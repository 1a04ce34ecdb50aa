// ciris-runtime/tests/conscience_retry.rs
// ============================================================================
// Module: Conscience Retry Scenario
// Description: An overriding faculty forces exactly one guided retry.
// ============================================================================
//! ## Overview
//! Injects a faculty that always requests reconsideration and checks the
//! retry count, the audit record, and the insight carried on the thought.

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

use std::sync::Arc;
use std::sync::atomic::Ordering;

use ciris_core::AuditEventType;
use ciris_core::ThoughtStore;
use helpers::AlwaysOverride;
use helpers::HarnessOptions;
use helpers::build_harness;
use serde_json::Value;

// ============================================================================
// SECTION: Scenario
// ============================================================================

/// Tests exactly one conscience-driven retry with recorded disagreement.
#[tokio::test]
async fn test_conscience_override_retries_once() {
    let harness = build_harness(HarnessOptions {
        faculties: vec![Arc::new(AlwaysOverride)],
        ..HarnessOptions::default()
    });
    let task_id = harness.submit("hello");
    harness.step().await;

    // One original selection plus exactly one guided retry; no third.
    assert_eq!(harness.selection_calls.load(Ordering::SeqCst), 2);

    let entries = harness.audit_entries();
    let override_entry = entries
        .iter()
        .find(|entry| entry.event_type == AuditEventType::ConscienceOverridden)
        .expect("override is audited");
    assert_eq!(override_entry.event_payload["overridden"], Value::Bool(true));
    let reason = override_entry.event_payload["override_reason"].as_str().unwrap();
    assert!(!reason.is_empty());
    assert_eq!(override_entry.event_payload["final_disagreement"], Value::Bool(true));

    // The evaluated thought carries the override insight for its children.
    let thoughts = harness.store.list_thoughts_for_task(&task_id).unwrap();
    let seed = &thoughts[0];
    assert!(seed.context.override_reason.as_deref().unwrap_or("").contains("always_override"));
    assert!(seed
        .context
        .epistemic_data
        .iter()
        .any(|insight| insight.faculty == "always_override"));

    // The follow-up inherits the accumulated insight.
    let follow_up = &thoughts[1];
    assert!(follow_up
        .context
        .epistemic_data
        .iter()
        .any(|insight| insight.faculty == "always_override"));
}

/// Tests that a clean conscience run records no override event.
#[tokio::test]
async fn test_no_override_event_without_faculties() {
    let harness = build_harness(HarnessOptions::default());
    harness.submit("hello");
    harness.step().await;

    assert_eq!(harness.selection_calls.load(Ordering::SeqCst), 1);
    let events = harness.audit_event_types();
    assert!(!events.contains(&AuditEventType::ConscienceOverridden));
}
