//! Connector tests: how `reconcile` reaches a queue.

use crate::common::{stored_ids, stored_version, versioned};

use jobsync::{
    BackendConnector, InMemoryConnector, InMemoryQueueStore, QueueStore, ReconcileError,
    StoreError, StoreOptions, reconcile,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Test: A closure connector receives the queue name and options verbatim.
#[tokio::test]
async fn test_closure_connector() {
    let store = Arc::new(InMemoryQueueStore::new());
    let seen: Arc<Mutex<Vec<(String, StoreOptions)>>> = Arc::new(Mutex::new(Vec::new()));

    let shared = Arc::clone(&store);
    let record = Arc::clone(&seen);
    let connector = move |queue: &str, options: &StoreOptions| {
        record
            .lock()
            .unwrap()
            .push((queue.to_string(), options.clone()));
        let store: Arc<dyn QueueStore> = shared.clone();
        Ok::<_, StoreError>(store)
    };

    let options = StoreOptions::new()
        .with("host", "localhost")
        .with("port", 6379)
        .with("tls", json!({"enabled": false}));
    reconcile(
        &connector,
        "myqueue",
        &options,
        vec![versioned("myjobid", "0.0.4")],
        false,
    )
    .await
    .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "myqueue");
    assert_eq!(seen[0].1, options);
    assert_eq!(
        stored_version(store.as_ref(), "myjobid").await.as_deref(),
        Some("0.0.4")
    );
}

/// Test: The in-memory registry keeps state between reconciliations.
#[tokio::test]
async fn test_in_memory_connector_keeps_state() {
    let connector = InMemoryConnector::new();
    let options = StoreOptions::new();

    reconcile(&connector, "q", &options, vec![versioned("a", "1.0.0")], false)
        .await
        .unwrap();
    let summary = reconcile(&connector, "q", &options, vec![versioned("a", "1.0.0")], false)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);

    reconcile(&connector, "other", &options, vec![versioned("b", "1.0.0")], false)
        .await
        .unwrap();

    let q = connector.queue("q").unwrap();
    assert_eq!(stored_ids(q.as_ref()).await, vec!["a"]);
}

/// Test: The backend connector refuses unknown backends and incomplete options.
#[tokio::test]
async fn test_backend_connector_options() {
    let connector = BackendConnector::new();

    let unknown = reconcile(
        &connector,
        "q",
        &StoreOptions::new().with("backend", "carrier-pigeon"),
        vec![versioned("a", "1.0.0")],
        false,
    )
    .await;
    assert!(matches!(
        unknown,
        Err(ReconcileError::Store(StoreError::InvalidOptions(_)))
    ));

    let summary = reconcile(
        &connector,
        "q",
        &StoreOptions::new(),
        vec![versioned("a", "1.0.0")],
        false,
    )
    .await
    .unwrap();
    assert_eq!(summary.created, 1);
}

/// Test: A connector can be shared as a trait object.
#[tokio::test]
async fn test_dyn_connector() {
    let connector: Box<dyn jobsync::StoreConnector> = Box::new(InMemoryConnector::new());
    let summary = reconcile(
        connector.as_ref(),
        "q",
        &StoreOptions::new(),
        vec![versioned("a", "1.0.0")],
        false,
    )
    .await
    .unwrap();
    assert_eq!(summary.created, 1);
}
