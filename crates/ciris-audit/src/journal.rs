// ciris-audit/src/journal.rs
// ============================================================================
// Module: Audit Journal
// Description: Line-oriented append-only audit entry log.
// Purpose: Provide the authoritative on-disk form of the audit chain.
// Dependencies: ciris-core, serde_json
// ============================================================================

//! ## Overview
//! The journal stores one JSON-encoded [`AuditEntry`] per line, flushed on
//! every append. On disagreement with the indexed store the journal is
//! authoritative; verification always reads from here. Opening an existing
//! journal recovers the tail state (next sequence, last hash) so appends
//! continue the chain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use ciris_core::AuditEntry;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Journal errors.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Journal I/O error.
    #[error("audit journal io error: {0}")]
    Io(String),
    /// Journal line failed to parse.
    #[error("audit journal parse error at line {line}: {message}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// Parser failure description.
        message: String,
    },
    /// Journal mutex poisoned.
    #[error("audit journal lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Journal
// ============================================================================

/// Append-only JSONL journal of audit entries.
pub struct Journal {
    /// Journal file path.
    path: PathBuf,
    /// Open append handle.
    file: Mutex<File>,
}

impl Journal {
    /// Opens or creates a journal at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| JournalError::Io(err.to_string()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
            .map_err(|err| JournalError::Io(err.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Appends one entry and flushes it to disk.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when serialization or the write fails.
    pub fn append(&self, entry: &AuditEntry) -> Result<(), JournalError> {
        let line = serde_json::to_string(entry).map_err(|err| JournalError::Parse {
            line: 0,
            message: err.to_string(),
        })?;
        let mut file = self.file.lock().map_err(|_| JournalError::Poisoned)?;
        writeln!(file, "{line}").map_err(|err| JournalError::Io(err.to_string()))?;
        file.flush().map_err(|err| JournalError::Io(err.to_string()))
    }

    /// Reads every entry in file order.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when the file cannot be read or a line fails
    /// to parse.
    pub fn read_all(&self) -> Result<Vec<AuditEntry>, JournalError> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|err| JournalError::Io(err.to_string()))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| JournalError::Io(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry =
                serde_json::from_str(&line).map_err(|err| JournalError::Parse {
                    line: index + 1,
                    message: err.to_string(),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Returns the last entry, when the journal is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when the journal cannot be read.
    pub fn last_entry(&self) -> Result<Option<AuditEntry>, JournalError> {
        Ok(self.read_all()?.into_iter().next_back())
    }
}
