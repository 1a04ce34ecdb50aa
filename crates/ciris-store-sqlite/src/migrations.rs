// ciris-store-sqlite/src/migrations.rs
// ============================================================================
// Module: Store Migrations
// Description: Numbered schema migrations applied in order.
// Purpose: Evolve the main database schema transactionally and recordably.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Each migration is a numbered SQL script applied inside a single
//! transaction. The `schema_migrations` table records applied versions, so
//! reopening a database applies only what is missing. Migrations never edit
//! prior scripts; schema changes append new versions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use thiserror::Error;

// ============================================================================
// SECTION: Migration Scripts
// ============================================================================

/// Ordered migration scripts as `(version, sql)` pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "CREATE TABLE tasks (
             task_id TEXT PRIMARY KEY,
             description TEXT NOT NULL,
             status TEXT NOT NULL,
             priority INTEGER NOT NULL,
             created_at INTEGER NOT NULL,
             updated_at INTEGER NOT NULL,
             parent_task_id TEXT,
             context_json TEXT NOT NULL,
             outcome_json TEXT,
             signed_by TEXT,
             signature TEXT,
             signed_at INTEGER
         );
         CREATE INDEX idx_tasks_status ON tasks (status, priority DESC);
         CREATE TABLE thoughts (
             thought_id TEXT PRIMARY KEY,
             source_task_id TEXT NOT NULL REFERENCES tasks (task_id),
             thought_type TEXT NOT NULL,
             status TEXT NOT NULL,
             round_number INTEGER NOT NULL,
             content TEXT NOT NULL,
             context_json TEXT NOT NULL,
             ponder_count INTEGER NOT NULL,
             parent_thought_id TEXT,
             final_action_json TEXT,
             created_at INTEGER NOT NULL,
             updated_at INTEGER NOT NULL
         );
         CREATE INDEX idx_thoughts_status ON thoughts (status, created_at);
         CREATE INDEX idx_thoughts_task ON thoughts (source_task_id, created_at);",
    ),
    (
        2,
        "CREATE TABLE correlations (
             row_id INTEGER PRIMARY KEY AUTOINCREMENT,
             correlation_id TEXT NOT NULL,
             service_type TEXT NOT NULL,
             correlation_type TEXT NOT NULL,
             timestamp INTEGER NOT NULL,
             metric_name TEXT,
             metric_value REAL,
             log_level TEXT,
             log_message TEXT,
             tags_json TEXT NOT NULL,
             retention_policy TEXT NOT NULL
         );
         CREATE INDEX idx_correlations_time ON correlations (timestamp);
         CREATE INDEX idx_correlations_chain ON correlations (correlation_id, timestamp);",
    ),
    (
        3,
        "CREATE TABLE graph_nodes (
             scope TEXT NOT NULL,
             node_id TEXT NOT NULL,
             node_type TEXT NOT NULL,
             attributes_json TEXT NOT NULL,
             version INTEGER NOT NULL,
             PRIMARY KEY (scope, node_id)
         );
         CREATE INDEX idx_graph_nodes_type ON graph_nodes (scope, node_type);
         CREATE TABLE graph_edges (
             row_id INTEGER PRIMARY KEY AUTOINCREMENT,
             from_id TEXT NOT NULL,
             to_id TEXT NOT NULL,
             relation TEXT NOT NULL,
             attributes_json TEXT NOT NULL
         );
         CREATE INDEX idx_graph_edges_from ON graph_edges (from_id);",
    ),
    (
        4,
        "CREATE TABLE scheduled_tasks (
             id TEXT PRIMARY KEY,
             goal_description TEXT NOT NULL,
             status TEXT NOT NULL,
             trigger_json TEXT NOT NULL,
             trigger_prompt TEXT NOT NULL,
             origin_thought_id TEXT,
             next_trigger_at INTEGER NOT NULL,
             deferral_count INTEGER NOT NULL
         );
         CREATE INDEX idx_scheduled_due ON scheduled_tasks (status, next_trigger_at);",
    ),
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Migration errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database error while applying a migration.
    #[error("migration {version} failed: {message}")]
    Failed {
        /// Migration version that failed.
        version: i64,
        /// Database failure description.
        message: String,
    },
    /// Database error while reading migration state.
    #[error("migration state error: {0}")]
    State(String),
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies every unapplied migration in order.
///
/// # Errors
///
/// Returns [`MigrationError`] when a script fails; the failing script's
/// transaction is rolled back and no later script runs.
pub fn apply_migrations(connection: &mut Connection) -> Result<(), MigrationError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                 version INTEGER PRIMARY KEY,
                 applied_at INTEGER NOT NULL
             );",
        )
        .map_err(|err| MigrationError::State(err.to_string()))?;

    for (version, sql) in MIGRATIONS {
        let applied: bool = connection
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
                [version],
                |row| row.get(0),
            )
            .map_err(|err| MigrationError::State(err.to_string()))?;
        if applied {
            continue;
        }

        let tx = connection.transaction().map_err(|err| MigrationError::Failed {
            version: *version,
            message: err.to_string(),
        })?;
        tx.execute_batch(sql).map_err(|err| MigrationError::Failed {
            version: *version,
            message: err.to_string(),
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, strftime('%s','now'))",
            [version],
        )
        .map_err(|err| MigrationError::Failed {
            version: *version,
            message: err.to_string(),
        })?;
        tx.commit().map_err(|err| MigrationError::Failed {
            version: *version,
            message: err.to_string(),
        })?;
        tracing::info!(version, "schema migration applied");
    }
    Ok(())
}

/// Returns the applied migration versions in order.
///
/// # Errors
///
/// Returns [`MigrationError::State`] when the table cannot be read.
pub fn applied_versions(connection: &Connection) -> Result<Vec<i64>, MigrationError> {
    let mut statement = connection
        .prepare("SELECT version FROM schema_migrations ORDER BY version")
        .map_err(|err| MigrationError::State(err.to_string()))?;
    let rows = statement
        .query_map([], |row| row.get(0))
        .map_err(|err| MigrationError::State(err.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| MigrationError::State(err.to_string()))
}
