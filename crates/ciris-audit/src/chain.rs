// ciris-audit/src/chain.rs
// ============================================================================
// Module: Audit Chain
// Description: Append-only hash-chained, signed audit log.
// Purpose: Give every runtime event a tamper-evident, verifiable record.
// Dependencies: ciris-core, crate::{index, journal, keys, verify}
// ============================================================================

//! ## Overview
//! The chain assigns gap-free sequence numbers, links entries by hash, signs
//! each entry hash with the active key, and writes two sinks: the JSONL
//! journal (authoritative) and the SQLite index. Opening an existing chain
//! recovers the tail from the journal. Key rotation is additive; prior keys
//! stay verifiable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use ciris_core::AuditEntry;
use ciris_core::AuditEntryHashForm;
use ciris_core::AuditEvent;
use ciris_core::AuditSink;
use ciris_core::Clock;
use ciris_core::EventId;
use ciris_core::GENESIS_PREVIOUS_HASH;
use ciris_core::ServiceError;
use ciris_core::SigningKeyId;
use ciris_core::Task;
use ciris_core::hashing::DEFAULT_HASH_ALGORITHM;
use ciris_core::hashing::HashError;
use ciris_core::hashing::hash_canonical_json;
use thiserror::Error;
use uuid::Uuid;

use crate::index::AuditIndex;
use crate::index::IndexError;
use crate::journal::Journal;
use crate::journal::JournalError;
use crate::keys::AuditSigner;
use crate::keys::KeyError;
use crate::keys::KeyRing;
use crate::verify::VerificationReport;
use crate::verify::verify_range;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit chain errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Journal sink failed.
    #[error(transparent)]
    Journal(#[from] JournalError),
    /// Index sink failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Key handling failed.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Canonical hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Chain state lock poisoned.
    #[error("audit chain lock poisoned")]
    Poisoned,
    /// Recovered journal tail is inconsistent.
    #[error("audit chain integrity failure: {0}")]
    Integrity(String),
}

impl From<AuditError> for ServiceError {
    fn from(error: AuditError) -> Self {
        match &error {
            AuditError::Journal(JournalError::Io(_)) | AuditError::Index(IndexError::Db(_)) => {
                Self::transient(error.to_string())
            }
            _ => Self::fatal(error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Chain State
// ============================================================================

/// Mutable tail state guarded for strictly serial appends.
struct ChainState {
    /// Sequence number the next entry receives.
    next_sequence: u64,
    /// Entry hash of the last appended entry, or the genesis sentinel.
    last_hash: String,
    /// Active signer for new entries.
    signer: AuditSigner,
    /// Verifying keys across rotations.
    keys: KeyRing,
}

// ============================================================================
// SECTION: Audit Chain
// ============================================================================

/// Append-only hash-chained, signed audit log with two sinks.
pub struct AuditChain {
    /// Authoritative JSONL journal.
    journal: Journal,
    /// SQLite mirror for indexed access.
    index: AuditIndex,
    /// Tail state; the mutex serializes sequence allocation.
    state: Mutex<ChainState>,
    /// Clock stamping entries.
    clock: Arc<dyn Clock>,
}

impl AuditChain {
    /// Opens the chain, recovering tail state from the journal.
    ///
    /// Registers the signer's public key in the ring and the index, and loads
    /// prior rotation keys from the index so old signatures verify.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when either sink cannot be opened or the
    /// recovered tail is inconsistent.
    pub fn open(
        journal_path: &Path,
        index_path: &Path,
        signer: AuditSigner,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuditError> {
        let journal = Journal::open(journal_path)?;
        let index = AuditIndex::open(index_path)?;

        let mut keys = KeyRing::new();
        let mut recorded_public_key = None;
        for (key_id, public_key) in index.list_signing_keys()? {
            if &key_id == signer.key_id() {
                recorded_public_key = Some(public_key.clone());
            }
            keys.add_base64(key_id, &public_key)?;
        }
        match recorded_public_key {
            Some(existing) if existing != signer.public_key_base64() => {
                // Re-recording a key id with fresh material would silently
                // invalidate every entry the old key signed.
                return Err(AuditError::Integrity(format!(
                    "signing key id {} already recorded with different key material",
                    signer.key_id()
                )));
            }
            Some(_) => {}
            None => index.record_signing_key(
                signer.key_id(),
                &signer.public_key_base64(),
                clock.now(),
            )?,
        }
        keys.add(signer.key_id().clone(), signer.verifying_key());

        let (next_sequence, last_hash) = match journal.last_entry()? {
            Some(entry) => (entry.sequence_number + 1, entry.entry_hash),
            None => (1, GENESIS_PREVIOUS_HASH.to_string()),
        };

        Ok(Self {
            journal,
            index,
            state: Mutex::new(ChainState {
                next_sequence,
                last_hash,
                signer,
                keys,
            }),
            clock,
        })
    }

    /// Appends an event, returning the signed entry.
    ///
    /// The journal is written first; an index failure after a successful
    /// journal write is logged but does not fail the append, since the
    /// journal is authoritative and the index is rebuildable.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when hashing, signing, or the journal write
    /// fails.
    pub fn append(&self, event: &AuditEvent) -> Result<AuditEntry, AuditError> {
        let mut state = self.state.lock().map_err(|_| AuditError::Poisoned)?;
        let sequence_number = state.next_sequence;
        let previous_hash = state.last_hash.clone();

        let hash_form = AuditEntryHashForm {
            event_id: EventId::new(Uuid::new_v4().to_string()),
            event_timestamp: self.clock.now(),
            event_type: event.event_type,
            originator_id: event.originator_id.clone(),
            event_payload: event.payload.clone(),
            sequence_number,
            previous_hash,
        };
        let entry_hash = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &hash_form)?.value;
        let signature = state.signer.sign(entry_hash.as_bytes());

        let entry = AuditEntry {
            sequence_number,
            event_id: hash_form.event_id,
            event_timestamp: hash_form.event_timestamp,
            event_type: hash_form.event_type,
            originator_id: hash_form.originator_id,
            event_payload: hash_form.event_payload,
            previous_hash: hash_form.previous_hash,
            entry_hash: entry_hash.clone(),
            signature,
            signing_key_id: state.signer.key_id().clone(),
        };

        self.journal.append(&entry)?;
        if let Err(err) = self.index.append(&entry) {
            tracing::warn!(error = %err, "audit index append failed; journal is authoritative");
        }

        state.next_sequence = sequence_number + 1;
        state.last_hash = entry_hash;
        Ok(entry)
    }

    /// Verifies entries whose sequence falls in `[from, to]` inclusive.
    ///
    /// Reads the authoritative journal, never the index.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the journal cannot be read.
    pub fn verify(&self, from: u64, to: u64) -> Result<VerificationReport, AuditError> {
        let entries = self.journal.read_all()?;
        let state = self.state.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(verify_range(&entries, &state.keys, from, to))
    }

    /// Verifies the whole chain.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the journal cannot be read.
    pub fn verify_all(&self) -> Result<VerificationReport, AuditError> {
        self.verify(1, u64::MAX)
    }

    /// Signs a task's canonical form for downstream accountability.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when hashing fails.
    pub fn sign_task(&self, task: &Task) -> Result<(String, SigningKeyId), AuditError> {
        let digest = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &task.signable_form())?;
        let state = self.state.lock().map_err(|_| AuditError::Poisoned)?;
        let signature = state.signer.sign(digest.value.as_bytes());
        Ok((signature, state.signer.key_id().clone()))
    }

    /// Rotates to a new signing key; prior keys remain verifiable.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the key cannot be recorded.
    pub fn rotate_key(&self, signer: AuditSigner) -> Result<(), AuditError> {
        let mut state = self.state.lock().map_err(|_| AuditError::Poisoned)?;
        if state.keys.contains(signer.key_id()) {
            return Err(AuditError::Integrity(format!(
                "rotation requires a fresh key id; {} is already recorded",
                signer.key_id()
            )));
        }
        self.index.record_signing_key(
            signer.key_id(),
            &signer.public_key_base64(),
            self.clock.now(),
        )?;
        state.keys.add(signer.key_id().clone(), signer.verifying_key());
        tracing::info!(key_id = %signer.key_id(), "audit signing key rotated");
        state.signer = signer;
        Ok(())
    }

    /// Returns the number of entries appended so far.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Poisoned`] when the state lock is poisoned.
    pub fn entry_count(&self) -> Result<u64, AuditError> {
        let state = self.state.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(state.next_sequence - 1)
    }
}

impl AuditSink for AuditChain {
    fn log(&self, event: &AuditEvent) -> Result<(), ServiceError> {
        self.append(event).map(|_| ()).map_err(ServiceError::from)
    }
}
