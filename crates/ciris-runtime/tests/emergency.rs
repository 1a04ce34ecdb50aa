// ciris-runtime/tests/emergency.rs
// ============================================================================
// Module: Emergency Shutdown Scenario
// Description: Signed SHUTDOWN_NOW accepted; expired or foreign rejected.
// ============================================================================
//! ## Overview
//! Verifies the emergency entry point end to end: allow-listed in-window
//! commands raise the shutdown intent with a receipt, and everything else is
//! rejected with a security-violation record and no transition.

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

use ciris_core::Clock;
use std::sync::Arc;

use ciris_audit::AuditSigner;
use ciris_audit::SigningAlgorithm;
use ciris_audit::sign_emergency_command;
use ciris_core::AuditEventType;
use ciris_core::SigningKeyId;
use ciris_core::WaId;
use ciris_runtime::EmergencyShutdown;
use helpers::HarnessOptions;
use helpers::build_harness;

// ============================================================================
// SECTION: Scenario
// ============================================================================

/// Tests acceptance of an allow-listed, in-window command.
#[tokio::test]
async fn test_emergency_shutdown_accepted() {
    let harness = build_harness(HarnessOptions::default());
    let authority =
        AuditSigner::generate(SigningKeyId::new("wa-1"), SigningAlgorithm::Ed25519).unwrap();
    let emergency = EmergencyShutdown::new(
        Arc::clone(&harness.audit),
        vec![authority.public_key_base64()],
        Arc::clone(&harness.clock) as _,
        harness.processor.shutdown_handle(),
    );

    let command = sign_emergency_command(
        "cmd-1",
        &WaId::new("wa-alpha"),
        &authority,
        harness.clock.now(),
        "containment drill",
    )
    .unwrap();
    emergency.handle_command(&command).unwrap();

    let shutdown = harness.processor.shutdown_handle();
    assert!(shutdown.is_requested());
    assert!(shutdown.reason().unwrap().contains("wa-alpha"));

    let events = harness.audit_event_types();
    assert!(events.contains(&AuditEventType::EmergencyCommandAccepted));
}

/// Tests rejection of an expired command: no transition occurs.
#[tokio::test]
async fn test_expired_emergency_command_rejected() {
    let harness = build_harness(HarnessOptions::default());
    let authority =
        AuditSigner::generate(SigningKeyId::new("wa-1"), SigningAlgorithm::Ed25519).unwrap();
    let emergency = EmergencyShutdown::new(
        Arc::clone(&harness.audit),
        vec![authority.public_key_base64()],
        Arc::clone(&harness.clock) as _,
        harness.processor.shutdown_handle(),
    );

    let issued = harness.clock.now();
    let command =
        sign_emergency_command("cmd-2", &WaId::new("wa-alpha"), &authority, issued, "too late")
            .unwrap();
    harness.clock.advance_millis(6 * 60 * 1_000);

    assert!(emergency.handle_command(&command).is_err());
    assert!(!harness.processor.shutdown_handle().is_requested());

    let events = harness.audit_event_types();
    assert!(events.contains(&AuditEventType::EmergencyCommandRejected));
    assert!(events.contains(&AuditEventType::SecurityViolation));
}

/// Tests rejection of a command signed by an unknown key.
#[tokio::test]
async fn test_unknown_key_emergency_command_rejected() {
    let harness = build_harness(HarnessOptions::default());
    let trusted =
        AuditSigner::generate(SigningKeyId::new("wa-1"), SigningAlgorithm::Ed25519).unwrap();
    let rogue =
        AuditSigner::generate(SigningKeyId::new("wa-x"), SigningAlgorithm::Ed25519).unwrap();
    let emergency = EmergencyShutdown::new(
        Arc::clone(&harness.audit),
        vec![trusted.public_key_base64()],
        Arc::clone(&harness.clock) as _,
        harness.processor.shutdown_handle(),
    );

    let command = sign_emergency_command(
        "cmd-3",
        &WaId::new("wa-rogue"),
        &rogue,
        harness.clock.now(),
        "not yours",
    )
    .unwrap();

    assert!(emergency.handle_command(&command).is_err());
    assert!(!harness.processor.shutdown_handle().is_requested());
    let events = harness.audit_event_types();
    assert!(events.contains(&AuditEventType::SecurityViolation));
}
