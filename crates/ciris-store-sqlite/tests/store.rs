// ciris-store-sqlite/tests/store.rs
// ============================================================================
// Module: Store Tests
// Description: Tests for typed persistence over SQLite.
// ============================================================================
//! ## Overview
//! Validates migrations, task lifecycle enforcement, thought queue ordering,
//! correlation queries and compaction, graph versioning, and scheduled-task
//! triggering.

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

use std::collections::BTreeMap;

use ciris_core::Correlation;
use ciris_core::CorrelationId;
use ciris_core::CorrelationStore;
use ciris_core::CorrelationType;
use ciris_core::GraphEdge;
use ciris_core::GraphNode;
use ciris_core::GraphScope;
use ciris_core::GraphStore;
use ciris_core::NodeId;
use ciris_core::NodeType;
use ciris_core::RetentionPolicy;
use ciris_core::ScheduleTrigger;
use ciris_core::ScheduledTask;
use ciris_core::ScheduledTaskId;
use ciris_core::ScheduledTaskStatus;
use ciris_core::ScheduledTaskStore;
use ciris_core::ServiceType;
use ciris_core::Task;
use ciris_core::TaskContext;
use ciris_core::TaskId;
use ciris_core::TaskOutcome;
use ciris_core::TaskStatus;
use ciris_core::TaskStore;
use ciris_core::Thought;
use ciris_core::ThoughtContext;
use ciris_core::ThoughtId;
use ciris_core::ThoughtStatus;
use ciris_core::ThoughtStore;
use ciris_core::Timestamp;
use ciris_core::interfaces::StoreError;
use ciris_store_sqlite::SqliteStore;
use ciris_store_sqlite::SqliteStoreConfig;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Millisecond timestamps used across the tests.
const T0: Timestamp = Timestamp::from_unix_millis(1_000);
/// A later timestamp.
const T1: Timestamp = Timestamp::from_unix_millis(2_000);

/// Builds a pending task.
fn task(id: &str) -> Task {
    Task::new(TaskId::new(id), format!("work on {id}"), 0, TaskContext::default(), T0)
}

/// Builds a pending seed thought for a task.
fn thought(id: &str, task_id: &str, at: Timestamp) -> Thought {
    Thought::seed(
        ThoughtId::new(id),
        TaskId::new(task_id),
        format!("consider {task_id}"),
        ThoughtContext::default(),
        at,
    )
}

// ============================================================================
// SECTION: Migrations
// ============================================================================

/// Tests that opening applies every migration once.
#[test]
fn test_migrations_applied_in_order() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig {
        path: dir.path().join("main.db"),
        busy_timeout_ms: 1_000,
    };
    drop(SqliteStore::open(&config).unwrap());

    // Reopening applies nothing new and keeps the record intact.
    drop(SqliteStore::open(&config).unwrap());
    let connection = rusqlite::Connection::open(dir.path().join("main.db")).unwrap();
    let versions = ciris_store_sqlite::applied_versions(&connection).unwrap();
    assert_eq!(versions, vec![1, 2, 3, 4]);
}

// ============================================================================
// SECTION: Tasks
// ============================================================================

/// Tests task round-trip and status listing order.
#[test]
fn test_task_round_trip_and_listing() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut low = task("task-low");
    low.priority = 1;
    let mut high = task("task-high");
    high.priority = 9;
    store.add_task(&low).unwrap();
    store.add_task(&high).unwrap();

    let loaded = store.get_task(&TaskId::new("task-low")).unwrap().unwrap();
    assert_eq!(loaded, low);

    let pending = store.list_tasks_by_status(TaskStatus::Pending).unwrap();
    assert_eq!(pending[0].task_id, high.task_id, "higher priority lists first");
}

/// Tests that illegal transitions and outcome-less completions fail.
#[test]
fn test_task_transition_enforcement() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_task(&task("task-1")).unwrap();
    let id = TaskId::new("task-1");

    let skipped = store.update_task_status(&id, TaskStatus::Completed, None, T1);
    assert!(matches!(skipped, Err(StoreError::IllegalTransition(_))));

    store.update_task_status(&id, TaskStatus::Active, None, T1).unwrap();
    let no_outcome = store.update_task_status(&id, TaskStatus::Completed, None, T1);
    assert!(matches!(no_outcome, Err(StoreError::Invalid(_))));

    let outcome = TaskOutcome::completed("done");
    store.update_task_status(&id, TaskStatus::Completed, Some(&outcome), T1).unwrap();
    let loaded = store.get_task(&id).unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Completed);
    assert_eq!(loaded.outcome, Some(outcome));

    // Terminal states accept no further transitions.
    let reopened = store.update_task_status(&id, TaskStatus::Active, None, T1);
    assert!(matches!(reopened, Err(StoreError::IllegalTransition(_))));
}

/// Tests deferred tasks returning to active.
#[test]
fn test_deferred_task_returns_to_active() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_task(&task("task-1")).unwrap();
    let id = TaskId::new("task-1");
    store.update_task_status(&id, TaskStatus::Active, None, T1).unwrap();
    store.update_task_status(&id, TaskStatus::Deferred, None, T1).unwrap();
    store.update_task_status(&id, TaskStatus::Active, None, T1).unwrap();
}

/// Tests the accountability signature columns.
#[test]
fn test_task_signature_persists() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_task(&task("task-1")).unwrap();
    let id = TaskId::new("task-1");
    store.sign_task(&id, "key-1", "c2lnbmF0dXJl", T1).unwrap();
    let loaded = store.get_task(&id).unwrap().unwrap();
    let signature = loaded.signature.unwrap();
    assert_eq!(signature.signed_by.as_str(), "key-1");
    assert_eq!(signature.signed_at, T1);
}

// ============================================================================
// SECTION: Thoughts
// ============================================================================

/// Tests pending-queue FIFO ordering and the active count.
#[test]
fn test_thought_queue_ordering() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_task(&task("task-1")).unwrap();
    store.add_thought(&thought("thought-b", "task-1", T1)).unwrap();
    store.add_thought(&thought("thought-a", "task-1", T0)).unwrap();

    let pending = store.list_pending_thoughts(10).unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].thought_id.as_str(), "thought-a", "creation order wins");
    assert_eq!(store.count_active_thoughts().unwrap(), 2);

    let limited = store.list_pending_thoughts(1).unwrap();
    assert_eq!(limited.len(), 1);
}

/// Tests status updates, final actions, and child listing.
#[test]
fn test_thought_updates_and_children() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_task(&task("task-1")).unwrap();
    let seed = thought("thought-1", "task-1", T0);
    store.add_thought(&seed).unwrap();
    let child = seed.follow_up(
        ThoughtId::new("thought-2"),
        ciris_core::ThoughtType::FollowUp,
        "continue",
        seed.context.clone(),
        T1,
    );
    store.add_thought(&child).unwrap();

    let children = store.get_child_thoughts(&seed.thought_id).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].round_number, 1);

    store
        .update_thought_status(&seed.thought_id, ThoughtStatus::Completed, None, T1)
        .unwrap();
    let loaded = store.get_thought(&seed.thought_id).unwrap().unwrap();
    assert_eq!(loaded.status, ThoughtStatus::Completed);

    store.increment_ponder_count(&seed.thought_id, T1).unwrap();
    let loaded = store.get_thought(&seed.thought_id).unwrap().unwrap();
    assert_eq!(loaded.ponder_count, 1);
}

/// Tests crash recovery resets processing thoughts to pending.
#[test]
fn test_recover_processing_thoughts() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_task(&task("task-1")).unwrap();
    store.add_thought(&thought("thought-1", "task-1", T0)).unwrap();
    store
        .update_thought_status(
            &ThoughtId::new("thought-1"),
            ThoughtStatus::Processing,
            None,
            T1,
        )
        .unwrap();

    let recovered = store.recover_processing_thoughts(T1).unwrap();
    assert_eq!(recovered, 1);
    let pending = store.list_pending_thoughts(10).unwrap();
    assert_eq!(pending.len(), 1);
}

// ============================================================================
// SECTION: Correlations
// ============================================================================

/// Builds a correlation row.
fn correlation(id: &str, at: Timestamp, retention: RetentionPolicy) -> Correlation {
    let mut tags = BTreeMap::new();
    tags.insert("operation".to_string(), "send_message".to_string());
    Correlation {
        correlation_id: CorrelationId::new(id),
        service_type: ServiceType::Communication,
        correlation_type: CorrelationType::ServiceCorrelation,
        timestamp: at,
        metric: None,
        log: None,
        tags,
        retention_policy: retention,
    }
}

/// Tests time-range and tag-filtered queries.
#[test]
fn test_correlation_query() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_correlation(&correlation("c-1", T0, RetentionPolicy::Standard)).unwrap();
    store.add_correlation(&correlation("c-2", T1, RetentionPolicy::Standard)).unwrap();

    let rows = store
        .query_correlations(T0, T0, None, &BTreeMap::new())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].correlation_id.as_str(), "c-1");

    let mut tags = BTreeMap::new();
    tags.insert("operation".to_string(), "send_message".to_string());
    let tagged = store.query_correlations(T0, T1, None, &tags).unwrap();
    assert_eq!(tagged.len(), 2);

    let mut missing = BTreeMap::new();
    missing.insert("operation".to_string(), "other".to_string());
    let none = store.query_correlations(T0, T1, None, &missing).unwrap();
    assert!(none.is_empty());
}

/// Tests that compaction removes only expired ephemeral rows.
#[test]
fn test_correlation_compaction() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.add_correlation(&correlation("old-eph", T0, RetentionPolicy::Ephemeral)).unwrap();
    store.add_correlation(&correlation("old-std", T0, RetentionPolicy::Standard)).unwrap();
    store.add_correlation(&correlation("new-eph", T1, RetentionPolicy::Ephemeral)).unwrap();

    let removed = store.compact_correlations(T1).unwrap();
    assert_eq!(removed, 1);
    let rows = store.query_correlations(T0, T1, None, &BTreeMap::new()).unwrap();
    assert_eq!(rows.len(), 2);
}

// ============================================================================
// SECTION: Graph
// ============================================================================

/// Tests node versioning, prefix queries, and edges.
#[test]
fn test_graph_nodes_and_edges() {
    let store = SqliteStore::open_in_memory().unwrap();
    let node = GraphNode::new(
        NodeId::new("user/alice"),
        NodeType::User,
        GraphScope::Local,
        json!({"name": "alice"}),
    );
    store.put_node(&node).unwrap();
    store.put_node(&node).unwrap();

    let loaded = store.get_node(GraphScope::Local, &NodeId::new("user/alice")).unwrap().unwrap();
    assert_eq!(loaded.version, 2, "every write bumps the version");

    store
        .put_node(&GraphNode::new(
            NodeId::new("user/bob"),
            NodeType::User,
            GraphScope::Local,
            json!({"name": "bob"}),
        ))
        .unwrap();
    let users = store.query_nodes(GraphScope::Local, Some(NodeType::User), Some("user/")).unwrap();
    assert_eq!(users.len(), 2);
    let alice_only = store.query_nodes(GraphScope::Local, None, Some("user/a")).unwrap();
    assert_eq!(alice_only.len(), 1);

    store
        .put_edge(&GraphEdge {
            from_id: NodeId::new("user/alice"),
            to_id: NodeId::new("user/bob"),
            relation: "knows".to_string(),
            attributes: json!({}),
        })
        .unwrap();

    store.delete_node(GraphScope::Local, &NodeId::new("user/alice")).unwrap();
    assert!(store.get_node(GraphScope::Local, &NodeId::new("user/alice")).unwrap().is_none());
}

/// Tests that scopes partition the node namespace.
#[test]
fn test_graph_scope_partition() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .put_node(&GraphNode::new(
            NodeId::new("shared"),
            NodeType::Concept,
            GraphScope::Local,
            json!({"v": "local"}),
        ))
        .unwrap();
    store
        .put_node(&GraphNode::new(
            NodeId::new("shared"),
            NodeType::Concept,
            GraphScope::Environment,
            json!({"v": "env"}),
        ))
        .unwrap();

    let local = store.get_node(GraphScope::Local, &NodeId::new("shared")).unwrap().unwrap();
    assert_eq!(local.attributes["v"], "local");
    let env = store.get_node(GraphScope::Environment, &NodeId::new("shared")).unwrap().unwrap();
    assert_eq!(env.attributes["v"], "env");
}

// ============================================================================
// SECTION: Scheduled Tasks
// ============================================================================

/// Tests due listing and one-shot completion.
#[test]
fn test_scheduled_one_shot() {
    let store = SqliteStore::open_in_memory().unwrap();
    let scheduled = ScheduledTask {
        id: ScheduledTaskId::new("sched-1"),
        goal_description: "follow up later".to_string(),
        status: ScheduledTaskStatus::Pending,
        trigger: ScheduleTrigger::DeferUntil(T1),
        trigger_prompt: "resume the deferred task".to_string(),
        origin_thought_id: None,
        next_trigger_at: T1,
        deferral_count: 1,
    };
    store.upsert_scheduled(&scheduled).unwrap();

    assert!(store.due_scheduled(T0, 0).unwrap().is_empty());
    let due = store.due_scheduled(T1, 0).unwrap();
    assert_eq!(due.len(), 1);

    store.mark_triggered(&ScheduledTaskId::new("sched-1"), T1).unwrap();
    assert!(store.due_scheduled(T1, 0).unwrap().is_empty(), "one-shot entries complete");
}

/// Tests that recurring entries advance their trigger time.
#[test]
fn test_scheduled_cron_advances() {
    let store = SqliteStore::open_in_memory().unwrap();
    let scheduled = ScheduledTask {
        id: ScheduledTaskId::new("sched-cron"),
        goal_description: "periodic maintenance".to_string(),
        status: ScheduledTaskStatus::Pending,
        trigger: ScheduleTrigger::Cron("*/5 * * * *".to_string()),
        trigger_prompt: "run maintenance".to_string(),
        origin_thought_id: None,
        next_trigger_at: T0,
        deferral_count: 0,
    };
    store.upsert_scheduled(&scheduled).unwrap();

    store.mark_triggered(&ScheduledTaskId::new("sched-cron"), T0).unwrap();
    assert!(store.due_scheduled(T0, 0).unwrap().is_empty());
    let later = T0.saturating_add_millis(5 * 60_000);
    let due = store.due_scheduled(later, 0).unwrap();
    assert_eq!(due.len(), 1, "recurring entries come due again");
    assert_eq!(due[0].status, ScheduledTaskStatus::Active);
}
