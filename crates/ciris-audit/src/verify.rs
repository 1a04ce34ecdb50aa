// ciris-audit/src/verify.rs
// ============================================================================
// Module: Audit Chain Verification
// Description: Offline verification of hash chaining and signatures.
// Purpose: Detect tampering and report the first violated sequence.
// Dependencies: ciris-core, crate::keys
// ============================================================================

//! ## Overview
//! Verification re-derives every entry hash from the canonical form, checks
//! chain linkage and gap-free sequencing, and verifies each signature against
//! the key ring. It requires nothing but the entries and the public keys, so
//! it runs offline against a copied journal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use ciris_core::AuditEntry;
use ciris_core::GENESIS_PREVIOUS_HASH;
use ciris_core::hashing::DEFAULT_HASH_ALGORITHM;
use ciris_core::hashing::hash_canonical_json;
use serde::Deserialize;
use serde::Serialize;

use crate::keys::KeyRing;

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Kind of chain violation detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The stored entry hash does not match the recomputed hash.
    HashMismatch,
    /// The entry's previous hash does not match its predecessor.
    ChainBreak,
    /// Sequence numbers are not consecutive.
    SequenceGap,
    /// The signature does not verify under its recorded key.
    SignatureInvalid,
    /// The signing key is not present in the ring.
    UnknownKey,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::HashMismatch => "hash_mismatch",
            Self::ChainBreak => "chain_break",
            Self::SequenceGap => "sequence_gap",
            Self::SignatureInvalid => "signature_invalid",
            Self::UnknownKey => "unknown_key",
        };
        f.write_str(label)
    }
}

/// Result of verifying a range of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationReport {
    /// Every checked entry is intact.
    Valid {
        /// Number of entries checked.
        checked: u64,
    },
    /// A violation was found.
    Invalid {
        /// First sequence number that failed verification.
        first_invalid: u64,
        /// Kind of violation at that sequence.
        kind: ViolationKind,
    },
}

impl VerificationReport {
    /// Returns true when the report is valid.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies entries whose sequence falls in `[from, to]` inclusive.
///
/// `entries` must be the full journal contents in file order; predecessors
/// outside the range still anchor chain-linkage checks. The genesis entry
/// must carry the genesis sentinel as its previous hash.
#[must_use]
pub fn verify_range(
    entries: &[AuditEntry],
    keys: &KeyRing,
    from: u64,
    to: u64,
) -> VerificationReport {
    let mut checked = 0u64;
    for (index, entry) in entries.iter().enumerate() {
        if entry.sequence_number < from || entry.sequence_number > to {
            continue;
        }
        checked += 1;

        let recomputed = match hash_canonical_json(DEFAULT_HASH_ALGORITHM, &entry.hash_form()) {
            Ok(digest) => digest.value,
            Err(_) => {
                return VerificationReport::Invalid {
                    first_invalid: entry.sequence_number,
                    kind: ViolationKind::HashMismatch,
                };
            }
        };
        if recomputed != entry.entry_hash {
            return VerificationReport::Invalid {
                first_invalid: entry.sequence_number,
                kind: ViolationKind::HashMismatch,
            };
        }

        if let Some(kind) = check_linkage(entries, index, entry) {
            return VerificationReport::Invalid {
                first_invalid: entry.sequence_number,
                kind,
            };
        }

        if !keys.contains(&entry.signing_key_id) {
            return VerificationReport::Invalid {
                first_invalid: entry.sequence_number,
                kind: ViolationKind::UnknownKey,
            };
        }
        if keys
            .verify(&entry.signing_key_id, entry.entry_hash.as_bytes(), &entry.signature)
            .is_err()
        {
            return VerificationReport::Invalid {
                first_invalid: entry.sequence_number,
                kind: ViolationKind::SignatureInvalid,
            };
        }
    }

    VerificationReport::Valid {
        checked,
    }
}

/// Checks sequence continuity and hash linkage against the predecessor.
fn check_linkage(
    entries: &[AuditEntry],
    index: usize,
    entry: &AuditEntry,
) -> Option<ViolationKind> {
    if index == 0 {
        if entry.sequence_number == 1 && entry.previous_hash != GENESIS_PREVIOUS_HASH {
            return Some(ViolationKind::ChainBreak);
        }
        return None;
    }
    let previous = &entries[index - 1];
    if entry.sequence_number != previous.sequence_number + 1 {
        return Some(ViolationKind::SequenceGap);
    }
    if entry.previous_hash != previous.entry_hash {
        return Some(ViolationKind::ChainBreak);
    }
    None
}
