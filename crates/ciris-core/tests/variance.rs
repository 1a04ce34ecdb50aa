// ciris-core/tests/variance.rs
// ============================================================================
// Module: Identity Variance Tests
// Description: Tests for the normalized attribute-diff metric.
// ============================================================================
//! ## Overview
//! Validates the variance metric used by the identity guard.

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
    clippy::float_cmp,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use ciris_core::identity_variance;
use serde_json::json;

// ============================================================================
// SECTION: Metric Cases
// ============================================================================

/// Tests that identical attribute maps have zero variance.
#[test]
fn test_identical_maps() {
    let value = json!({"name": "ciris", "purpose": "reasoning"});
    assert_eq!(identity_variance(&value, &value), 0.0);
}

/// Tests that fully disjoint maps have full variance.
#[test]
fn test_disjoint_maps() {
    let current = json!({"a": 1, "b": 2});
    let proposed = json!({"c": 3, "d": 4});
    assert_eq!(identity_variance(&current, &proposed), 1.0);
}

/// Tests a partial change: one of four union keys altered.
#[test]
fn test_partial_change() {
    let current = json!({"name": "ciris", "purpose": "reasoning", "version": 1});
    let proposed = json!({"name": "ciris", "purpose": "reasoning", "version": 2});
    assert_eq!(identity_variance(&current, &proposed), 1.0 / 3.0);
}

/// Tests that added keys count as changed.
#[test]
fn test_added_key() {
    let current = json!({"name": "ciris"});
    let proposed = json!({"name": "ciris", "motto": "do no harm"});
    assert_eq!(identity_variance(&current, &proposed), 0.5);
}

/// Tests that removed keys count as changed.
#[test]
fn test_removed_key() {
    let current = json!({"name": "ciris", "motto": "do no harm"});
    let proposed = json!({"name": "ciris"});
    assert_eq!(identity_variance(&current, &proposed), 0.5);
}

/// Tests non-object payloads compare as a single attribute.
#[test]
fn test_non_object_payloads() {
    assert_eq!(identity_variance(&json!("a"), &json!("a")), 0.0);
    assert_eq!(identity_variance(&json!("a"), &json!("b")), 1.0);
}

/// Tests that empty maps have zero variance.
#[test]
fn test_empty_maps() {
    assert_eq!(identity_variance(&json!({}), &json!({})), 0.0);
}

/// Tests that deep values compare by deep equality.
#[test]
fn test_nested_value_change() {
    let current = json!({"traits": {"kind": true}});
    let proposed = json!({"traits": {"kind": false}});
    assert_eq!(identity_variance(&current, &proposed), 1.0);
}
