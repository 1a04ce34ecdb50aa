// ciris-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Persistence Store
// Description: Typed store for tasks, thoughts, correlations, graph, schedule.
// Purpose: Implement the core persistence traits over one WAL database.
// Dependencies: ciris-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! One WAL-mode SQLite database holds every entity kind behind a guarded
//! connection, which serializes writes strictly stronger than the per-kind
//! requirement. Enum columns store their serde labels; structured fields
//! store canonical JSON. Transient lock contention is retried with
//! exponential backoff (100 ms base, 1 s cap, 3 retries); decoding failures
//! fail closed as corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use ciris_core::Correlation;
use ciris_core::CorrelationId;
use ciris_core::CorrelationStore;
use ciris_core::CorrelationType;
use ciris_core::GraphEdge;
use ciris_core::GraphNode;
use ciris_core::GraphScope;
use ciris_core::GraphStore;
use ciris_core::LogFields;
use ciris_core::MetricFields;
use ciris_core::NodeId;
use ciris_core::NodeType;
use ciris_core::ScheduledTask;
use ciris_core::ScheduledTaskId;
use ciris_core::ScheduledTaskStatus;
use ciris_core::ScheduledTaskStore;
use ciris_core::SelectedAction;
use ciris_core::ServiceType;
use ciris_core::SigningKeyId;
use ciris_core::Task;
use ciris_core::TaskId;
use ciris_core::TaskOutcome;
use ciris_core::TaskSignature;
use ciris_core::TaskStatus;
use ciris_core::TaskStore;
use ciris_core::Thought;
use ciris_core::ThoughtId;
use ciris_core::ThoughtStatus;
use ciris_core::ThoughtStore;
use ciris_core::Timestamp;
use ciris_core::interfaces::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::migrations::MigrationError;
use crate::migrations::apply_migrations;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Base backoff delay for busy retries.
const BUSY_BASE_DELAY_MS: u64 = 100;
/// Backoff cap for busy retries.
const BUSY_MAX_DELAY_MS: u64 = 1_000;
/// Maximum busy retries per operation.
const BUSY_MAX_RETRIES: u32 = 3;
/// Default busy timeout handed to `SQLite`.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the `SQLite` store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed implementation of every persistence trait.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens the store, applying pragmas and pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened or migrated.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))?;
            }
        }
        let mut connection =
            Connection::open(&config.path).map_err(|err| StoreError::Io(err.to_string()))?;
        connection
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| StoreError::Store(err.to_string()))?;
        connection
            .execute_batch("PRAGMA journal_mode = wal; PRAGMA synchronous = full;")
            .map_err(|err| StoreError::Store(err.to_string()))?;
        apply_migrations(&mut connection).map_err(migration_error)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory store for tests and dream-state sandboxes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut connection =
            Connection::open_in_memory().map_err(|err| StoreError::Io(err.to_string()))?;
        apply_migrations(&mut connection).map_err(migration_error)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs an operation on the guarded connection with busy retries.
    fn with_connection<T>(
        &self,
        op: impl Fn(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let connection = self.connection.lock().map_err(|_| {
            StoreError::Store("store mutex poisoned".to_string())
        })?;
        let mut attempt = 0u32;
        loop {
            match op(&connection) {
                Ok(value) => return Ok(value),
                Err(err) if is_busy(&err) && attempt < BUSY_MAX_RETRIES => {
                    attempt += 1;
                    let delay = (BUSY_BASE_DELAY_MS * 2u64.saturating_pow(attempt - 1))
                        .min(BUSY_MAX_DELAY_MS);
                    tracing::debug!(attempt, delay_ms = delay, "store busy, backing off");
                    std::thread::sleep(Duration::from_millis(delay));
                }
                Err(err) => return Err(map_db_error(&err)),
            }
        }
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Returns true for transient lock-contention errors.
fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::DatabaseBusy || inner.code == ErrorCode::DatabaseLocked
    )
}

/// Maps a database error onto the store error taxonomy.
fn map_db_error(error: &rusqlite::Error) -> StoreError {
    match error {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::DatabaseCorrupt =>
        {
            StoreError::Corrupt(error.to_string())
        }
        _ => StoreError::Store(error.to_string()),
    }
}

/// Maps migration failures onto the store error taxonomy.
fn migration_error(error: MigrationError) -> StoreError {
    StoreError::VersionMismatch(error.to_string())
}

// ============================================================================
// SECTION: Enum and JSON Encoding
// ============================================================================

/// Encodes a unit enum as its serde label without quotes.
fn enum_label<T: Serialize>(value: &T) -> Result<String, StoreError> {
    let encoded =
        serde_json::to_string(value).map_err(|err| StoreError::Invalid(err.to_string()))?;
    Ok(encoded.trim_matches('"').to_string())
}

/// Parses a unit enum from its serde label.
fn parse_enum<T: DeserializeOwned>(label: &str) -> Result<T, StoreError> {
    serde_json::from_str(&format!("\"{label}\""))
        .map_err(|err| StoreError::Corrupt(format!("bad enum label {label}: {err}")))
}

/// Encodes a structured field as JSON.
fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Invalid(err.to_string()))
}

/// Decodes a structured field from JSON, failing closed on corruption.
fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, StoreError> {
    serde_json::from_str(json).map_err(|err| StoreError::Corrupt(err.to_string()))
}

// ============================================================================
// SECTION: Task Store
// ============================================================================

impl TaskStore for SqliteStore {
    fn add_task(&self, task: &Task) -> Result<(), StoreError> {
        let status = enum_label(&task.status)?;
        let context = to_json(&task.context)?;
        let outcome = task.outcome.as_ref().map(to_json).transpose()?;
        self.with_connection(|connection| {
            connection.execute(
                "INSERT INTO tasks (
                    task_id, description, status, priority, created_at, updated_at,
                    parent_task_id, context_json, outcome_json, signed_by, signature, signed_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL, NULL)",
                params![
                    task.task_id.as_str(),
                    task.description,
                    status,
                    task.priority,
                    task.created_at.unix_millis(),
                    task.updated_at.unix_millis(),
                    task.parent_task_id.as_ref().map(TaskId::as_str),
                    context,
                    outcome,
                ],
            )?;
            Ok(())
        })
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        let row = self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT task_id, description, status, priority, created_at, updated_at,
                            parent_task_id, context_json, outcome_json, signed_by, signature,
                            signed_at
                     FROM tasks WHERE task_id = ?1",
                    params![task_id.as_str()],
                    task_row,
                )
                .optional()
        })?;
        row.map(decode_task).transpose()
    }

    fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        outcome: Option<&TaskOutcome>,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let current = self
            .get_task(task_id)?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if !current.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition(format!(
                "task {task_id}: cannot transition from {} to {}",
                enum_label(&current.status)?,
                enum_label(&status)?
            )));
        }
        if status == TaskStatus::Completed && outcome.is_none() {
            return Err(StoreError::Invalid(format!(
                "task {task_id}: completion requires an outcome"
            )));
        }
        let status = enum_label(&status)?;
        let outcome = outcome.map(to_json).transpose()?;
        self.with_connection(|connection| {
            connection.execute(
                "UPDATE tasks SET status = ?2, outcome_json = COALESCE(?3, outcome_json),
                        updated_at = ?4
                 WHERE task_id = ?1",
                params![task_id.as_str(), status, outcome, now.unix_millis()],
            )?;
            Ok(())
        })
    }

    fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let status = enum_label(&status)?;
        let rows = self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT task_id, description, status, priority, created_at, updated_at,
                        parent_task_id, context_json, outcome_json, signed_by, signature,
                        signed_at
                 FROM tasks WHERE status = ?1
                 ORDER BY priority DESC, created_at ASC",
            )?;
            let rows = statement.query_map(params![status], task_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        rows.into_iter().map(decode_task).collect()
    }

    fn sign_task(
        &self,
        task_id: &TaskId,
        signed_by: &str,
        signature: &str,
        signed_at: Timestamp,
    ) -> Result<(), StoreError> {
        let changed = self.with_connection(|connection| {
            connection.execute(
                "UPDATE tasks SET signed_by = ?2, signature = ?3, signed_at = ?4
                 WHERE task_id = ?1",
                params![task_id.as_str(), signed_by, signature, signed_at.unix_millis()],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(task_id.to_string()));
        }
        Ok(())
    }
}

/// Raw task row as stored.
type TaskRow = (
    String,
    String,
    String,
    i32,
    i64,
    i64,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
);

/// Extracts a raw task row.
fn task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

/// Decodes a raw task row, failing closed on corruption.
fn decode_task(row: TaskRow) -> Result<Task, StoreError> {
    let (
        task_id,
        description,
        status,
        priority,
        created_at,
        updated_at,
        parent_task_id,
        context,
        outcome,
        signed_by,
        signature,
        signed_at,
    ) = row;
    let signature = match (signed_by, signature, signed_at) {
        (Some(signed_by), Some(signature), Some(signed_at)) => Some(TaskSignature {
            signed_by: SigningKeyId::new(signed_by),
            signature,
            signed_at: Timestamp::from_unix_millis(signed_at),
        }),
        _ => None,
    };
    Ok(Task {
        task_id: TaskId::new(task_id),
        description,
        status: parse_enum(&status)?,
        priority,
        created_at: Timestamp::from_unix_millis(created_at),
        updated_at: Timestamp::from_unix_millis(updated_at),
        parent_task_id: parent_task_id.map(TaskId::new),
        context: from_json(&context)?,
        outcome: outcome.as_deref().map(from_json).transpose()?,
        signature,
    })
}

// ============================================================================
// SECTION: Thought Store
// ============================================================================

impl ThoughtStore for SqliteStore {
    fn add_thought(&self, thought: &Thought) -> Result<(), StoreError> {
        let thought_type = enum_label(&thought.thought_type)?;
        let status = enum_label(&thought.status)?;
        let context = to_json(&thought.context)?;
        let final_action = thought.final_action.as_ref().map(to_json).transpose()?;
        self.with_connection(|connection| {
            connection.execute(
                "INSERT INTO thoughts (
                    thought_id, source_task_id, thought_type, status, round_number, content,
                    context_json, ponder_count, parent_thought_id, final_action_json,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    thought.thought_id.as_str(),
                    thought.source_task_id.as_str(),
                    thought_type,
                    status,
                    thought.round_number,
                    thought.content,
                    context,
                    thought.ponder_count,
                    thought.parent_thought_id.as_ref().map(ThoughtId::as_str),
                    final_action,
                    thought.created_at.unix_millis(),
                    thought.updated_at.unix_millis(),
                ],
            )?;
            Ok(())
        })
    }

    fn get_thought(&self, thought_id: &ThoughtId) -> Result<Option<Thought>, StoreError> {
        let row = self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT thought_id, source_task_id, thought_type, status, round_number,
                            content, context_json, ponder_count, parent_thought_id,
                            final_action_json, created_at, updated_at
                     FROM thoughts WHERE thought_id = ?1",
                    params![thought_id.as_str()],
                    thought_row,
                )
                .optional()
        })?;
        row.map(decode_thought).transpose()
    }

    fn update_thought_status(
        &self,
        thought_id: &ThoughtId,
        status: ThoughtStatus,
        final_action: Option<&SelectedAction>,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let status = enum_label(&status)?;
        let final_action = final_action.map(to_json).transpose()?;
        let changed = self.with_connection(|connection| {
            connection.execute(
                "UPDATE thoughts SET status = ?2,
                        final_action_json = COALESCE(?3, final_action_json), updated_at = ?4
                 WHERE thought_id = ?1",
                params![thought_id.as_str(), status, final_action, now.unix_millis()],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(thought_id.to_string()));
        }
        Ok(())
    }

    fn list_pending_thoughts(&self, limit: usize) -> Result<Vec<Thought>, StoreError> {
        let limit = i64::try_from(limit)
            .map_err(|_| StoreError::Invalid("limit too large".to_string()))?;
        let rows = self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT thought_id, source_task_id, thought_type, status, round_number,
                        content, context_json, ponder_count, parent_thought_id,
                        final_action_json, created_at, updated_at
                 FROM thoughts WHERE status = 'pending'
                 ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            )?;
            let rows = statement.query_map(params![limit], thought_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        rows.into_iter().map(decode_thought).collect()
    }

    fn get_child_thoughts(&self, parent_id: &ThoughtId) -> Result<Vec<Thought>, StoreError> {
        let rows = self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT thought_id, source_task_id, thought_type, status, round_number,
                        content, context_json, ponder_count, parent_thought_id,
                        final_action_json, created_at, updated_at
                 FROM thoughts WHERE parent_thought_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = statement.query_map(params![parent_id.as_str()], thought_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        rows.into_iter().map(decode_thought).collect()
    }

    fn count_active_thoughts(&self) -> Result<usize, StoreError> {
        let count: i64 = self.with_connection(|connection| {
            connection.query_row(
                "SELECT COUNT(*) FROM thoughts WHERE status IN ('pending', 'processing')",
                [],
                |row| row.get(0),
            )
        })?;
        usize::try_from(count).map_err(|_| StoreError::Corrupt("negative count".to_string()))
    }

    fn list_thoughts_for_task(&self, task_id: &TaskId) -> Result<Vec<Thought>, StoreError> {
        let rows = self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT thought_id, source_task_id, thought_type, status, round_number,
                        content, context_json, ponder_count, parent_thought_id,
                        final_action_json, created_at, updated_at
                 FROM thoughts WHERE source_task_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = statement.query_map(params![task_id.as_str()], thought_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        rows.into_iter().map(decode_thought).collect()
    }

    fn increment_ponder_count(
        &self,
        thought_id: &ThoughtId,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let changed = self.with_connection(|connection| {
            connection.execute(
                "UPDATE thoughts SET ponder_count = ponder_count + 1, updated_at = ?2
                 WHERE thought_id = ?1",
                params![thought_id.as_str(), now.unix_millis()],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(thought_id.to_string()));
        }
        Ok(())
    }

    fn update_thought_context(
        &self,
        thought_id: &ThoughtId,
        context: &ciris_core::ThoughtContext,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let context = to_json(context)?;
        let changed = self.with_connection(|connection| {
            connection.execute(
                "UPDATE thoughts SET context_json = ?2, updated_at = ?3 WHERE thought_id = ?1",
                params![thought_id.as_str(), context, now.unix_millis()],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(thought_id.to_string()));
        }
        Ok(())
    }

    fn recover_processing_thoughts(&self, now: Timestamp) -> Result<usize, StoreError> {
        let changed = self.with_connection(|connection| {
            connection.execute(
                "UPDATE thoughts SET status = 'pending', updated_at = ?1
                 WHERE status = 'processing'",
                params![now.unix_millis()],
            )
        })?;
        Ok(changed)
    }
}

/// Raw thought row as stored.
type ThoughtRow = (
    String,
    String,
    String,
    String,
    u32,
    String,
    String,
    u32,
    Option<String>,
    Option<String>,
    i64,
    i64,
);

/// Extracts a raw thought row.
fn thought_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThoughtRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

/// Decodes a raw thought row, failing closed on corruption.
fn decode_thought(row: ThoughtRow) -> Result<Thought, StoreError> {
    let (
        thought_id,
        source_task_id,
        thought_type,
        status,
        round_number,
        content,
        context,
        ponder_count,
        parent_thought_id,
        final_action,
        created_at,
        updated_at,
    ) = row;
    Ok(Thought {
        thought_id: ThoughtId::new(thought_id),
        source_task_id: TaskId::new(source_task_id),
        thought_type: parse_enum(&thought_type)?,
        status: parse_enum(&status)?,
        round_number,
        content,
        context: from_json(&context)?,
        ponder_count,
        parent_thought_id: parent_thought_id.map(ThoughtId::new),
        final_action: final_action.as_deref().map(from_json).transpose()?,
        created_at: Timestamp::from_unix_millis(created_at),
        updated_at: Timestamp::from_unix_millis(updated_at),
    })
}

// ============================================================================
// SECTION: Correlation Store
// ============================================================================

impl CorrelationStore for SqliteStore {
    fn add_correlation(&self, correlation: &Correlation) -> Result<(), StoreError> {
        let service_type = enum_label(&correlation.service_type)?;
        let correlation_type = enum_label(&correlation.correlation_type)?;
        let retention = enum_label(&correlation.retention_policy)?;
        let tags = to_json(&correlation.tags)?;
        self.with_connection(|connection| {
            connection.execute(
                "INSERT INTO correlations (
                    correlation_id, service_type, correlation_type, timestamp,
                    metric_name, metric_value, log_level, log_message, tags_json,
                    retention_policy
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    correlation.correlation_id.as_str(),
                    service_type,
                    correlation_type,
                    correlation.timestamp.unix_millis(),
                    correlation.metric.as_ref().map(|metric| metric.name.clone()),
                    correlation.metric.as_ref().map(|metric| metric.value),
                    correlation.log.as_ref().map(|log| log.level.clone()),
                    correlation.log.as_ref().map(|log| log.message.clone()),
                    tags,
                    retention,
                ],
            )?;
            Ok(())
        })
    }

    fn query_correlations(
        &self,
        from: Timestamp,
        to: Timestamp,
        correlation_type: Option<CorrelationType>,
        tags: &BTreeMap<String, String>,
    ) -> Result<Vec<Correlation>, StoreError> {
        let type_label = correlation_type.map(|value| enum_label(&value)).transpose()?;
        let rows = self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT correlation_id, service_type, correlation_type, timestamp,
                        metric_name, metric_value, log_level, log_message, tags_json,
                        retention_policy
                 FROM correlations
                 WHERE timestamp >= ?1 AND timestamp <= ?2
                   AND (?3 IS NULL OR correlation_type = ?3)
                 ORDER BY timestamp ASC, row_id ASC",
            )?;
            let rows = statement.query_map(
                params![from.unix_millis(), to.unix_millis(), type_label],
                correlation_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        let decoded: Result<Vec<Correlation>, StoreError> =
            rows.into_iter().map(decode_correlation).collect();
        Ok(decoded?
            .into_iter()
            .filter(|row| tags.iter().all(|(key, value)| row.tags.get(key) == Some(value)))
            .collect())
    }

    fn compact_correlations(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        self.with_connection(|connection| {
            connection.execute(
                "DELETE FROM correlations
                 WHERE retention_policy = 'ephemeral' AND timestamp < ?1",
                params![cutoff.unix_millis()],
            )
        })
    }
}

/// Raw correlation row as stored.
type CorrelationRow = (
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<f64>,
    Option<String>,
    Option<String>,
    String,
    String,
);

/// Extracts a raw correlation row.
fn correlation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CorrelationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

/// Decodes a raw correlation row, failing closed on corruption.
fn decode_correlation(row: CorrelationRow) -> Result<Correlation, StoreError> {
    let (
        correlation_id,
        service_type,
        correlation_type,
        timestamp,
        metric_name,
        metric_value,
        log_level,
        log_message,
        tags,
        retention,
    ) = row;
    let metric = match (metric_name, metric_value) {
        (Some(name), Some(value)) => Some(MetricFields {
            name,
            value,
        }),
        _ => None,
    };
    let log = match (log_level, log_message) {
        (Some(level), Some(message)) => Some(LogFields {
            level,
            message,
        }),
        _ => None,
    };
    let service_type: ServiceType = parse_enum(&service_type)?;
    Ok(Correlation {
        correlation_id: CorrelationId::new(correlation_id),
        service_type,
        correlation_type: parse_enum(&correlation_type)?,
        timestamp: Timestamp::from_unix_millis(timestamp),
        metric,
        log,
        tags: from_json(&tags)?,
        retention_policy: parse_enum(&retention)?,
    })
}

// ============================================================================
// SECTION: Graph Store
// ============================================================================

impl GraphStore for SqliteStore {
    fn put_node(&self, node: &GraphNode) -> Result<(), StoreError> {
        let scope = enum_label(&node.scope)?;
        let node_type = enum_label(&node.node_type)?;
        let attributes = to_json(&node.attributes)?;
        self.with_connection(|connection| {
            let existing: Option<i64> = connection
                .query_row(
                    "SELECT version FROM graph_nodes WHERE scope = ?1 AND node_id = ?2",
                    params![scope, node.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let version = existing.map_or(1, |version| version + 1);
            connection.execute(
                "INSERT OR REPLACE INTO graph_nodes
                    (scope, node_id, node_type, attributes_json, version)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![scope, node.id.as_str(), node_type, attributes, version],
            )?;
            Ok(())
        })
    }

    fn get_node(&self, scope: GraphScope, id: &NodeId) -> Result<Option<GraphNode>, StoreError> {
        let scope_label = enum_label(&scope)?;
        let row = self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT node_id, node_type, attributes_json, version
                     FROM graph_nodes WHERE scope = ?1 AND node_id = ?2",
                    params![scope_label, id.as_str()],
                    |row| {
                        let node_id: String = row.get(0)?;
                        let node_type: String = row.get(1)?;
                        let attributes: String = row.get(2)?;
                        let version: i64 = row.get(3)?;
                        Ok((node_id, node_type, attributes, version))
                    },
                )
                .optional()
        })?;
        row.map(|(node_id, node_type, attributes, version)| {
            Ok(GraphNode {
                id: NodeId::new(node_id),
                node_type: parse_enum(&node_type)?,
                scope,
                attributes: from_json(&attributes)?,
                version: u64::try_from(version)
                    .map_err(|_| StoreError::Corrupt("negative node version".to_string()))?,
            })
        })
        .transpose()
    }

    fn delete_node(&self, scope: GraphScope, id: &NodeId) -> Result<(), StoreError> {
        let scope = enum_label(&scope)?;
        self.with_connection(|connection| {
            connection.execute(
                "DELETE FROM graph_nodes WHERE scope = ?1 AND node_id = ?2",
                params![scope, id.as_str()],
            )?;
            Ok(())
        })
    }

    fn query_nodes(
        &self,
        scope: GraphScope,
        node_type: Option<NodeType>,
        id_prefix: Option<&str>,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let scope_label = enum_label(&scope)?;
        let type_label = node_type.map(|value| enum_label(&value)).transpose()?;
        let prefix = id_prefix.map(|prefix| format!("{prefix}%"));
        let rows = self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT node_id, node_type, attributes_json, version
                 FROM graph_nodes
                 WHERE scope = ?1
                   AND (?2 IS NULL OR node_type = ?2)
                   AND (?3 IS NULL OR node_id LIKE ?3)
                 ORDER BY node_id ASC",
            )?;
            let rows = statement.query_map(params![scope_label, type_label, prefix], |row| {
                let node_id: String = row.get(0)?;
                let node_type: String = row.get(1)?;
                let attributes: String = row.get(2)?;
                let version: i64 = row.get(3)?;
                Ok((node_id, node_type, attributes, version))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        rows.into_iter()
            .map(|(node_id, node_type, attributes, version)| {
                Ok(GraphNode {
                    id: NodeId::new(node_id),
                    node_type: parse_enum(&node_type)?,
                    scope,
                    attributes: from_json(&attributes)?,
                    version: u64::try_from(version)
                        .map_err(|_| StoreError::Corrupt("negative node version".to_string()))?,
                })
            })
            .collect()
    }

    fn put_edge(&self, edge: &GraphEdge) -> Result<(), StoreError> {
        let attributes = to_json(&edge.attributes)?;
        self.with_connection(|connection| {
            connection.execute(
                "INSERT INTO graph_edges (from_id, to_id, relation, attributes_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![edge.from_id.as_str(), edge.to_id.as_str(), edge.relation, attributes],
            )?;
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Scheduled Task Store
// ============================================================================

impl ScheduledTaskStore for SqliteStore {
    fn upsert_scheduled(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let status = enum_label(&task.status)?;
        let trigger = to_json(&task.trigger)?;
        self.with_connection(|connection| {
            connection.execute(
                "INSERT OR REPLACE INTO scheduled_tasks (
                    id, goal_description, status, trigger_json, trigger_prompt,
                    origin_thought_id, next_trigger_at, deferral_count
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.id.as_str(),
                    task.goal_description,
                    status,
                    trigger,
                    task.trigger_prompt,
                    task.origin_thought_id.as_ref().map(ThoughtId::as_str),
                    task.next_trigger_at.unix_millis(),
                    task.deferral_count,
                ],
            )?;
            Ok(())
        })
    }

    fn due_scheduled(
        &self,
        now: Timestamp,
        lookahead_millis: i64,
    ) -> Result<Vec<ScheduledTask>, StoreError> {
        let horizon = now.saturating_add_millis(lookahead_millis);
        let rows = self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT id, goal_description, status, trigger_json, trigger_prompt,
                        origin_thought_id, next_trigger_at, deferral_count
                 FROM scheduled_tasks
                 WHERE status IN ('pending', 'active') AND next_trigger_at <= ?1
                 ORDER BY next_trigger_at ASC",
            )?;
            let rows = statement.query_map(params![horizon.unix_millis()], scheduled_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        rows.into_iter().map(decode_scheduled).collect()
    }

    fn mark_triggered(&self, id: &ScheduledTaskId, now: Timestamp) -> Result<(), StoreError> {
        let current = {
            let rows = self.with_connection(|connection| {
                connection
                    .query_row(
                        "SELECT id, goal_description, status, trigger_json, trigger_prompt,
                                origin_thought_id, next_trigger_at, deferral_count
                         FROM scheduled_tasks WHERE id = ?1",
                        params![id.as_str()],
                        scheduled_row,
                    )
                    .optional()
            })?;
            rows.map(decode_scheduled)
                .transpose()?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?
        };

        let (status, next_trigger_at) = match &current.trigger {
            ciris_core::ScheduleTrigger::DeferUntil(_) => {
                (ScheduledTaskStatus::Complete, current.next_trigger_at)
            }
            ciris_core::ScheduleTrigger::Cron(expression) => (
                ScheduledTaskStatus::Active,
                now.saturating_add_millis(cron_interval_millis(expression)),
            ),
        };
        let status = enum_label(&status)?;
        self.with_connection(|connection| {
            connection.execute(
                "UPDATE scheduled_tasks SET status = ?2, next_trigger_at = ?3 WHERE id = ?1",
                params![id.as_str(), status, next_trigger_at.unix_millis()],
            )?;
            Ok(())
        })
    }
}

/// Raw scheduled-task row as stored.
type ScheduledRow = (String, String, String, String, String, Option<String>, i64, u32);

/// Extracts a raw scheduled-task row.
fn scheduled_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

/// Decodes a raw scheduled-task row, failing closed on corruption.
fn decode_scheduled(row: ScheduledRow) -> Result<ScheduledTask, StoreError> {
    let (id, goal_description, status, trigger, trigger_prompt, origin, next_trigger_at, count) =
        row;
    Ok(ScheduledTask {
        id: ScheduledTaskId::new(id),
        goal_description,
        status: parse_enum(&status)?,
        trigger: from_json(&trigger)?,
        trigger_prompt,
        origin_thought_id: origin.map(ThoughtId::new),
        next_trigger_at: Timestamp::from_unix_millis(next_trigger_at),
        deferral_count: count,
    })
}

/// Milliseconds in one day, the fallback cron interval.
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1_000;

/// Derives a retrigger interval from a cron expression.
///
/// Supports the `*/N * * * *` minute form; every other expression falls back
/// to daily.
fn cron_interval_millis(expression: &str) -> i64 {
    expression
        .split_whitespace()
        .next()
        .and_then(|field| field.strip_prefix("*/"))
        .and_then(|minutes| minutes.parse::<i64>().ok())
        .map_or(DAY_MILLIS, |minutes| minutes.saturating_mul(60_000))
}
