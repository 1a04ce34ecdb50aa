// ciris-audit/src/index.rs
// ============================================================================
// Module: Audit SQLite Index
// Description: Indexed mirror of the audit journal plus the key table.
// Purpose: Serve queries over audit history without scanning the journal.
// Dependencies: ciris-core, rusqlite
// ============================================================================

//! ## Overview
//! The index mirrors every journal entry into SQLite and records signing
//! public keys across rotations. The journal remains authoritative; the index
//! is rebuildable from it and disagreement resolves in the journal's favor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use ciris_core::AuditEntry;
use ciris_core::AuditEventType;
use ciris_core::EventId;
use ciris_core::SigningKeyId;
use ciris_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Index errors.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Database error.
    #[error("audit index db error: {0}")]
    Db(String),
    /// Stored data failed to decode.
    #[error("audit index invalid data: {0}")]
    Invalid(String),
    /// Index mutex poisoned.
    #[error("audit index lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Index
// ============================================================================

/// SQLite mirror of the audit chain.
pub struct AuditIndex {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl AuditIndex {
    /// Opens or creates the index database.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Db`] when the database cannot be opened or
    /// initialized.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| IndexError::Db(err.to_string()))?;
            }
        }
        let connection = Connection::open(path).map_err(|err| IndexError::Db(err.to_string()))?;
        connection
            .execute_batch(
                "PRAGMA journal_mode = wal;
                 PRAGMA synchronous = full;
                 CREATE TABLE IF NOT EXISTS audit_log (
                     sequence_number INTEGER PRIMARY KEY,
                     event_id TEXT NOT NULL,
                     event_timestamp INTEGER NOT NULL,
                     event_type TEXT NOT NULL,
                     originator_id TEXT NOT NULL,
                     event_payload TEXT NOT NULL,
                     previous_hash TEXT NOT NULL,
                     entry_hash TEXT NOT NULL,
                     signature TEXT NOT NULL,
                     signing_key_id TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS audit_signing_keys (
                     key_id TEXT PRIMARY KEY,
                     public_key TEXT NOT NULL,
                     created_at INTEGER NOT NULL,
                     active INTEGER NOT NULL
                 );",
            )
            .map_err(|err| IndexError::Db(err.to_string()))?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Mirrors one entry into the index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the insert fails.
    pub fn append(&self, entry: &AuditEntry) -> Result<(), IndexError> {
        let event_type = serde_json::to_string(&entry.event_type)
            .map_err(|err| IndexError::Invalid(err.to_string()))?;
        let payload = serde_json::to_string(&entry.event_payload)
            .map_err(|err| IndexError::Invalid(err.to_string()))?;
        let sequence = i64::try_from(entry.sequence_number)
            .map_err(|_| IndexError::Invalid("sequence number overflow".to_string()))?;
        let connection = self.connection.lock().map_err(|_| IndexError::Poisoned)?;
        connection
            .execute(
                "INSERT INTO audit_log (
                    sequence_number, event_id, event_timestamp, event_type,
                    originator_id, event_payload, previous_hash, entry_hash,
                    signature, signing_key_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    sequence,
                    entry.event_id.as_str(),
                    entry.event_timestamp.unix_millis(),
                    event_type,
                    entry.originator_id,
                    payload,
                    entry.previous_hash,
                    entry.entry_hash,
                    entry.signature,
                    entry.signing_key_id.as_str(),
                ],
            )
            .map_err(|err| IndexError::Db(err.to_string()))?;
        Ok(())
    }

    /// Records a signing public key, marking it active and prior keys inactive.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the write fails.
    pub fn record_signing_key(
        &self,
        key_id: &SigningKeyId,
        public_key_base64: &str,
        created_at: Timestamp,
    ) -> Result<(), IndexError> {
        let mut connection = self.connection.lock().map_err(|_| IndexError::Poisoned)?;
        let tx = connection.transaction().map_err(|err| IndexError::Db(err.to_string()))?;
        tx.execute("UPDATE audit_signing_keys SET active = 0", [])
            .map_err(|err| IndexError::Db(err.to_string()))?;
        tx.execute(
            "INSERT OR REPLACE INTO audit_signing_keys (key_id, public_key, created_at, active)
             VALUES (?1, ?2, ?3, 1)",
            params![key_id.as_str(), public_key_base64, created_at.unix_millis()],
        )
        .map_err(|err| IndexError::Db(err.to_string()))?;
        tx.commit().map_err(|err| IndexError::Db(err.to_string()))
    }

    /// Lists every recorded signing key as `(key_id, public_key)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the query fails.
    pub fn list_signing_keys(&self) -> Result<Vec<(SigningKeyId, String)>, IndexError> {
        let connection = self.connection.lock().map_err(|_| IndexError::Poisoned)?;
        let mut statement = connection
            .prepare("SELECT key_id, public_key FROM audit_signing_keys ORDER BY created_at")
            .map_err(|err| IndexError::Db(err.to_string()))?;
        let rows = statement
            .query_map([], |row| {
                let key_id: String = row.get(0)?;
                let public_key: String = row.get(1)?;
                Ok((SigningKeyId::new(key_id), public_key))
            })
            .map_err(|err| IndexError::Db(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| IndexError::Db(err.to_string()))
    }

    /// Reads one entry by sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the read fails or the row fails to decode.
    pub fn get(&self, sequence_number: u64) -> Result<Option<AuditEntry>, IndexError> {
        let sequence = i64::try_from(sequence_number)
            .map_err(|_| IndexError::Invalid("sequence number overflow".to_string()))?;
        let connection = self.connection.lock().map_err(|_| IndexError::Poisoned)?;
        connection
            .query_row(
                "SELECT sequence_number, event_id, event_timestamp, event_type, originator_id,
                        event_payload, previous_hash, entry_hash, signature, signing_key_id
                 FROM audit_log WHERE sequence_number = ?1",
                params![sequence],
                decode_entry_row,
            )
            .optional()
            .map_err(|err| IndexError::Db(err.to_string()))?
            .transpose()
    }

    /// Counts mirrored entries.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the query fails.
    pub fn count(&self) -> Result<u64, IndexError> {
        let connection = self.connection.lock().map_err(|_| IndexError::Poisoned)?;
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(|err| IndexError::Db(err.to_string()))?;
        u64::try_from(count).map_err(|_| IndexError::Invalid("negative count".to_string()))
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Decodes one `audit_log` row; JSON failures surface as [`IndexError`].
fn decode_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<AuditEntry, IndexError>> {
    let sequence: i64 = row.get(0)?;
    let event_id: String = row.get(1)?;
    let timestamp: i64 = row.get(2)?;
    let event_type: String = row.get(3)?;
    let originator_id: String = row.get(4)?;
    let payload: String = row.get(5)?;
    let previous_hash: String = row.get(6)?;
    let entry_hash: String = row.get(7)?;
    let signature: String = row.get(8)?;
    let signing_key_id: String = row.get(9)?;

    Ok(build_entry(
        sequence,
        event_id,
        timestamp,
        &event_type,
        originator_id,
        &payload,
        previous_hash,
        entry_hash,
        signature,
        signing_key_id,
    ))
}

/// Builds an [`AuditEntry`] from decoded row fields.
#[allow(clippy::too_many_arguments, reason = "Column-per-argument row decoding.")]
fn build_entry(
    sequence: i64,
    event_id: String,
    timestamp: i64,
    event_type: &str,
    originator_id: String,
    payload: &str,
    previous_hash: String,
    entry_hash: String,
    signature: String,
    signing_key_id: String,
) -> Result<AuditEntry, IndexError> {
    let event_type: AuditEventType =
        serde_json::from_str(event_type).map_err(|err| IndexError::Invalid(err.to_string()))?;
    let event_payload: serde_json::Value =
        serde_json::from_str(payload).map_err(|err| IndexError::Invalid(err.to_string()))?;
    let sequence_number = u64::try_from(sequence)
        .map_err(|_| IndexError::Invalid("negative sequence number".to_string()))?;
    Ok(AuditEntry {
        sequence_number,
        event_id: EventId::new(event_id),
        event_timestamp: Timestamp::from_unix_millis(timestamp),
        event_type,
        originator_id,
        event_payload,
        previous_hash,
        entry_hash,
        signature,
        signing_key_id: SigningKeyId::new(signing_key_id),
    })
}
