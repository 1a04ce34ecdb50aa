// ciris-audit/tests/chain.rs
// ============================================================================
// Module: Audit Chain Tests
// Description: Tests for chaining, signatures, tampering, and rotation.
// ============================================================================
//! ## Overview
//! Validates gap-free sequencing, hash linkage, signature verification,
//! tamper detection with first-invalid reporting, reopen continuity, and
//! additive key rotation.

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

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ciris_audit::AuditChain;
use ciris_audit::AuditSigner;
use ciris_audit::SigningAlgorithm;
use ciris_audit::VerificationReport;
use ciris_audit::ViolationKind;
use ciris_core::AuditEvent;
use ciris_core::AuditEventType;
use ciris_core::Clock;
use ciris_core::GENESIS_PREVIOUS_HASH;
use ciris_core::ManualClock;
use ciris_core::SigningKeyId;
use ciris_core::Task;
use ciris_core::TaskContext;
use ciris_core::TaskId;
use ciris_core::Timestamp;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a chain in a temp directory.
fn chain_in(dir: &TempDir, key_id: &str) -> AuditChain {
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(1_000)));
    let signer = AuditSigner::generate(SigningKeyId::new(key_id), SigningAlgorithm::Ed25519)
        .unwrap();
    AuditChain::open(
        &dir.path().join("audit.jsonl"),
        &dir.path().join("audit.db"),
        signer,
        clock as Arc<dyn Clock>,
    )
    .unwrap()
}

/// Appends `count` simple events.
fn append_events(chain: &AuditChain, count: u64) {
    for index in 0..count {
        chain
            .append(&AuditEvent::new(AuditEventType::ThoughtCreated, "test", json!({
                "index": index,
            })))
            .unwrap();
    }
}

// ============================================================================
// SECTION: Chain Integrity
// ============================================================================

/// Tests that appended entries chain gap-free from the genesis sentinel.
#[test]
fn test_append_chains_from_genesis() {
    let dir = TempDir::new().unwrap();
    let chain = chain_in(&dir, "key-1");

    let first = chain
        .append(&AuditEvent::new(AuditEventType::TaskCreated, "test", json!({"n": 1})))
        .unwrap();
    let second = chain
        .append(&AuditEvent::new(AuditEventType::ThoughtCreated, "test", json!({"n": 2})))
        .unwrap();

    assert_eq!(first.sequence_number, 1);
    assert_eq!(first.previous_hash, GENESIS_PREVIOUS_HASH);
    assert_eq!(second.sequence_number, 2);
    assert_eq!(second.previous_hash, first.entry_hash);
}

/// Tests that append then verify reports valid for any range.
#[test]
fn test_verify_after_append() {
    let dir = TempDir::new().unwrap();
    let chain = chain_in(&dir, "key-1");
    append_events(&chain, 10);

    assert!(chain.verify_all().unwrap().is_valid());
    let partial = chain.verify(3, 7).unwrap();
    let VerificationReport::Valid {
        checked,
    } = partial
    else {
        panic!("expected a valid range");
    };
    assert_eq!(checked, 5);
}

/// Tests that reopening continues the chain without gaps.
#[test]
fn test_reopen_continues_chain() {
    let dir = TempDir::new().unwrap();
    {
        let chain = chain_in(&dir, "boot-1");
        append_events(&chain, 3);
    }
    // A new boot signs with a fresh key id; prior keys stay in the ring.
    let chain = chain_in(&dir, "boot-2");
    let entry = chain
        .append(&AuditEvent::new(AuditEventType::TaskCreated, "test", json!({"n": 4})))
        .unwrap();
    assert_eq!(entry.sequence_number, 4);
    assert!(chain.verify_all().unwrap().is_valid());
}

/// Tests that reusing a key id with fresh material fails closed.
#[test]
fn test_key_id_reuse_fails_closed() {
    let dir = TempDir::new().unwrap();
    {
        let chain = chain_in(&dir, "boot-1");
        append_events(&chain, 1);
    }
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(1_000)));
    let fresh_material =
        AuditSigner::generate(SigningKeyId::new("boot-1"), SigningAlgorithm::Ed25519).unwrap();
    let reopened = AuditChain::open(
        &dir.path().join("audit.jsonl"),
        &dir.path().join("audit.db"),
        fresh_material,
        clock as Arc<dyn Clock>,
    );
    assert!(reopened.is_err());
}

// ============================================================================
// SECTION: Tamper Detection
// ============================================================================

/// Tests that corrupting an interior payload reports that sequence.
#[test]
fn test_payload_tamper_detected() {
    let dir = TempDir::new().unwrap();
    let chain = chain_in(&dir, "key-1");
    append_events(&chain, 8);

    corrupt_payload(&dir.path().join("audit.jsonl"), 5);

    let report = chain.verify_all().unwrap();
    let VerificationReport::Invalid {
        first_invalid,
        kind,
    } = report
    else {
        panic!("expected tampering to be detected");
    };
    assert_eq!(first_invalid, 5);
    assert_eq!(kind, ViolationKind::HashMismatch);
}

/// Tests that removing an interior entry reports a sequence gap.
#[test]
fn test_missing_entry_detected() {
    let dir = TempDir::new().unwrap();
    let chain = chain_in(&dir, "key-1");
    append_events(&chain, 6);

    remove_line(&dir.path().join("audit.jsonl"), 3);

    let report = chain.verify_all().unwrap();
    let VerificationReport::Invalid {
        first_invalid,
        kind,
    } = report
    else {
        panic!("expected the gap to be detected");
    };
    assert_eq!(first_invalid, 4);
    assert_eq!(kind, ViolationKind::SequenceGap);
}

/// Rewrites the payload of the entry at `sequence` in the journal file.
fn corrupt_payload(path: &Path, sequence: u64) {
    let contents = fs::read_to_string(path).unwrap();
    let lines: Vec<String> = contents
        .lines()
        .map(|line| {
            let mut entry: serde_json::Value = serde_json::from_str(line).unwrap();
            if entry["sequence_number"] == json!(sequence) {
                entry["event_payload"] = json!({"tampered": true});
            }
            serde_json::to_string(&entry).unwrap()
        })
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// Removes the entry at `sequence` from the journal file.
fn remove_line(path: &Path, sequence: u64) {
    let contents = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = contents
        .lines()
        .filter(|line| {
            let entry: serde_json::Value = serde_json::from_str(line).unwrap();
            entry["sequence_number"] != json!(sequence)
        })
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

// ============================================================================
// SECTION: Key Rotation
// ============================================================================

/// Tests that rotation is additive: old signatures stay verifiable.
#[test]
fn test_key_rotation_keeps_old_signatures_verifiable() {
    let dir = TempDir::new().unwrap();
    let chain = chain_in(&dir, "key-1");
    append_events(&chain, 3);

    let next =
        AuditSigner::generate(SigningKeyId::new("key-2"), SigningAlgorithm::Ed25519).unwrap();
    chain.rotate_key(next).unwrap();
    append_events(&chain, 3);

    assert!(chain.verify_all().unwrap().is_valid());
    assert_eq!(chain.entry_count().unwrap(), 6);
}

/// Tests that the rsa-pss placeholder fails closed at key generation.
#[test]
fn test_rsa_pss_fails_closed() {
    let result = AuditSigner::generate(SigningKeyId::new("key-r"), SigningAlgorithm::RsaPss);
    assert!(result.is_err());
}

// ============================================================================
// SECTION: Task Signing
// ============================================================================

/// Tests that task signatures verify under the recorded key.
#[test]
fn test_sign_task() {
    let dir = TempDir::new().unwrap();
    let chain = chain_in(&dir, "key-1");
    let task = Task::new(
        TaskId::new("task-1"),
        "greet the user",
        0,
        TaskContext::default(),
        Timestamp::from_unix_millis(0),
    );

    let (signature, signer_id) = chain.sign_task(&task).unwrap();
    assert!(!signature.is_empty());
    assert_eq!(signer_id, SigningKeyId::new("key-1"));
}
