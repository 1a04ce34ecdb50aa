// ciris-audit/tests/command.rs
// ============================================================================
// Module: Emergency Command Tests
// Description: Tests for signed SHUTDOWN_NOW verification.
// ============================================================================
//! ## Overview
//! Validates acceptance of allow-listed, in-window signed commands and
//! rejection of everything else, fail-closed.

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

use ciris_audit::AuditSigner;
use ciris_audit::COMMAND_VALIDITY_WINDOW_MILLIS;
use ciris_audit::CommandRejection;
use ciris_audit::SigningAlgorithm;
use ciris_audit::sign_emergency_command;
use ciris_audit::verify_emergency_command;
use ciris_core::SigningKeyId;
use ciris_core::Timestamp;
use ciris_core::WaId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Generates an authority signer.
fn authority() -> AuditSigner {
    AuditSigner::generate(SigningKeyId::new("wa-1"), SigningAlgorithm::Ed25519).unwrap()
}

// ============================================================================
// SECTION: Acceptance
// ============================================================================

/// Tests that an allow-listed, in-window command verifies.
#[test]
fn test_valid_command_accepted() {
    let signer = authority();
    let now = Timestamp::from_unix_millis(1_000_000);
    let command = sign_emergency_command(
        "cmd-1",
        &WaId::new("wa-alpha"),
        &signer,
        now,
        "operator requested immediate stop",
    )
    .unwrap();

    let allowed = vec![signer.public_key_base64()];
    assert!(verify_emergency_command(&command, &allowed, now).is_ok());

    // Anywhere inside the five-minute window is accepted.
    let late = now.saturating_add_millis(COMMAND_VALIDITY_WINDOW_MILLIS - 1);
    assert!(verify_emergency_command(&command, &allowed, late).is_ok());
}

// ============================================================================
// SECTION: Rejection
// ============================================================================

/// Tests that an expired command is rejected.
#[test]
fn test_expired_command_rejected() {
    let signer = authority();
    let issued = Timestamp::from_unix_millis(1_000_000);
    let command =
        sign_emergency_command("cmd-1", &WaId::new("wa-alpha"), &signer, issued, "stop").unwrap();

    let allowed = vec![signer.public_key_base64()];
    let late = issued.saturating_add_millis(COMMAND_VALIDITY_WINDOW_MILLIS + 1);
    let result = verify_emergency_command(&command, &allowed, late);
    assert!(matches!(result, Err(CommandRejection::OutsideValidityWindow)));
}

/// Tests that a non-allow-listed key is rejected.
#[test]
fn test_unknown_key_rejected() {
    let signer = authority();
    let now = Timestamp::from_unix_millis(1_000_000);
    let command =
        sign_emergency_command("cmd-1", &WaId::new("wa-alpha"), &signer, now, "stop").unwrap();

    let other = authority();
    let allowed = vec![other.public_key_base64()];
    let result = verify_emergency_command(&command, &allowed, now);
    assert!(matches!(result, Err(CommandRejection::KeyNotAllowed)));
}

/// Tests that a command type other than SHUTDOWN_NOW is rejected.
#[test]
fn test_wrong_command_type_rejected() {
    let signer = authority();
    let now = Timestamp::from_unix_millis(1_000_000);
    let mut command =
        sign_emergency_command("cmd-1", &WaId::new("wa-alpha"), &signer, now, "stop").unwrap();
    command.command_type = "RESTART_NOW".to_string();

    let allowed = vec![signer.public_key_base64()];
    let result = verify_emergency_command(&command, &allowed, now);
    assert!(matches!(result, Err(CommandRejection::WrongCommandType(_))));
}

/// Tests that field tampering invalidates the signature.
#[test]
fn test_tampered_field_rejected() {
    let signer = authority();
    let now = Timestamp::from_unix_millis(1_000_000);
    let mut command =
        sign_emergency_command("cmd-1", &WaId::new("wa-alpha"), &signer, now, "stop").unwrap();
    command.reason = "different reason".to_string();

    let allowed = vec![signer.public_key_base64()];
    let result = verify_emergency_command(&command, &allowed, now);
    assert!(matches!(result, Err(CommandRejection::InvalidSignature(_))));
}
