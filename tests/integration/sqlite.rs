//! SQLite backend tests.
//!
//! These run the same reconciliation scenarios against a database file, and
//! check that state survives reopening it.

use crate::common::{counts, repeating, stored_ids, stored_version, versioned};

use jobsync::{
    BackendConnector, JobId, QueueInspector, QueueStore, Reconciler, RepeatInterval,
    SqliteQueueStore, StoreOptions, reconcile,
};
use std::time::Duration;
use tempfile::TempDir;

/// Test: Reconciliation state persists across reopening the database.
#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");

    {
        let store = SqliteQueueStore::open(&path, "emails").await.unwrap();
        Reconciler::new(&store)
            .reconcile(vec![versioned("a", "1.0.0"), repeating("r", 5)])
            .await
            .unwrap();
        store.close().await;
    }

    let store = SqliteQueueStore::open(&path, "emails").await.unwrap();
    assert_eq!(stored_ids(&store).await, vec!["a", "r"]);
    assert_eq!(store.list_repeatables().await.unwrap().len(), 1);

    let summary = Reconciler::new(&store)
        .reconcile(vec![versioned("a", "1.0.0")])
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert!(!summary.changed());
}

/// Test: Queues sharing a database file stay separate.
#[tokio::test]
async fn test_queues_are_isolated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");

    let emails = SqliteQueueStore::open(&path, "emails").await.unwrap();
    let reports = SqliteQueueStore::open(&path, "reports").await.unwrap();

    Reconciler::new(&emails)
        .reconcile(vec![versioned("a", "1.0.0")])
        .await
        .unwrap();
    Reconciler::new(&reports)
        .with_prune(true)
        .reconcile(vec![versioned("b", "1.0.0")])
        .await
        .unwrap();

    assert_eq!(stored_ids(&emails).await, vec!["a"]);
    assert_eq!(stored_ids(&reports).await, vec!["b"]);
}

/// Test: Version gate, timestamp preservation and retargeting on SQLite.
#[tokio::test]
async fn test_reconcile_semantics() {
    let store = SqliteQueueStore::in_memory("q").await.unwrap();

    Reconciler::new(&store)
        .reconcile(vec![versioned("myjobid", "0.0.5"), repeating("r", 5)])
        .await
        .unwrap();
    let before = store.get_job(&JobId::new("myjobid")).await.unwrap().unwrap();

    let blocked = Reconciler::new(&store)
        .reconcile(vec![versioned("myjobid", "0.0.4")])
        .await
        .unwrap();
    assert_eq!(blocked.skipped, 1);
    assert_eq!(stored_version(&store, "myjobid").await.as_deref(), Some("0.0.5"));

    tokio::time::sleep(Duration::from_millis(5)).await;
    Reconciler::new(&store)
        .reconcile(vec![
            versioned("myjobid", "0.0.6").with_attempts(3),
            repeating("r", 8),
        ])
        .await
        .unwrap();

    let after = store.get_job(&JobId::new("myjobid")).await.unwrap().unwrap();
    assert_eq!(after.timestamp, before.timestamp);
    assert_eq!(after.options.attempts, Some(3));

    let repeatables = store.list_repeatables().await.unwrap();
    assert_eq!(repeatables.len(), 1);
    assert_eq!(repeatables[0].interval, RepeatInterval::Every { every: 8 });
}

/// Test: The backend connector opens SQLite from options.
#[tokio::test]
async fn test_backend_connector_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");
    let options = StoreOptions::new()
        .with("backend", "sqlite")
        .with("path", path.to_string_lossy().to_string());
    let connector = BackendConnector::new();

    let mut desired = vec![
        versioned("d1", "1.0.0").with_delay(3600),
        versioned("d2", "1.0.0").with_delay(8),
    ];
    desired.extend((0..200).map(|i| versioned(&format!("i{}", i), "1.0.0")));
    reconcile(&connector, "bulk", &options, desired, false)
        .await
        .unwrap();

    let store = SqliteQueueStore::open(&path, "bulk").await.unwrap();
    let counts = counts(&store).await;
    assert_eq!(counts.waiting, 200);
    assert_eq!(counts.delayed, 2);

    let missing_path = reconcile(
        &connector,
        "bulk",
        &StoreOptions::new().with("backend", "sqlite"),
        vec![versioned("x", "1.0.0")],
        false,
    )
    .await;
    assert!(missing_path.is_err());
}
