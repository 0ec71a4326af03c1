//! Reconciliation scenarios against the in-memory queue.

use crate::common::{counts, many, repeating, stored_ids, stored_version, unversioned, versioned};

use jobsync::{
    InMemoryQueueStore, JobConfig, JobData, JobId, JobState, QueueInspector, QueueStore,
    ReconcileError, Reconciler, RepeatInterval, RepeatOptions, ValidationError,
};
use serde_json::json;
use std::time::{Duration, Instant};

async fn apply(store: &InMemoryQueueStore, desired: Vec<JobConfig>, prune: bool) {
    Reconciler::new(store)
        .with_prune(prune)
        .reconcile(desired)
        .await
        .unwrap();
}

/// Test: A missing job is created with its data, name and options.
#[tokio::test]
async fn test_creates_missing_job() {
    let store = InMemoryQueueStore::new();
    apply(
        &store,
        vec![
            JobConfig::new("myjobid", json!({"_version": "0.0.4", "a": "g"}))
                .with_name("Heisenberg")
                .with_attempts(5)
                .with_delay(8),
        ],
        false,
    )
    .await;

    let job = store.get_job(&JobId::new("myjobid")).await.unwrap().unwrap();
    assert_eq!(job.data, JobData::from(json!({"_version": "0.0.4", "a": "g"})));
    assert_eq!(job.name.as_deref(), Some("Heisenberg"));
    assert_eq!(job.options.attempts, Some(5));
    assert_eq!(job.options.delay, Some(8));
    assert_eq!(job.state, JobState::Delayed);
}

/// Test: Sequence payloads are stored as given.
#[tokio::test]
async fn test_accepts_sequence_data() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![JobConfig::new("seq", json!([{"a": "g"}]))], false).await;

    let job = store.get_job(&JobId::new("seq")).await.unwrap().unwrap();
    assert_eq!(job.data, JobData::from(json!([{"a": "g"}])));
}

/// Test: Reconciling the same set twice changes nothing the second time.
#[tokio::test]
async fn test_second_run_only_skips() {
    let store = InMemoryQueueStore::new();
    let desired = || vec![versioned("a", "1.0.0"), versioned("b", "2.1.0")];

    let first = Reconciler::new(&store).reconcile(desired()).await.unwrap();
    assert_eq!(first.created, 2);
    let before = store.list_jobs().await.unwrap();

    let second = Reconciler::new(&store).reconcile(desired()).await.unwrap();
    assert_eq!(second.skipped, 2);
    assert!(!second.changed());

    let mut after = store.list_jobs().await.unwrap();
    let mut before = before;
    before.sort_by(|a, b| a.key.cmp(&b.key));
    after.sort_by(|a, b| a.key.cmp(&b.key));
    assert_eq!(before, after);
}

/// Test: One invalid entry rejects the whole set and the queue stays empty.
#[tokio::test]
async fn test_invalid_set_creates_nothing() {
    let store = InMemoryQueueStore::new();

    let duplicate = Reconciler::new(&store)
        .reconcile(vec![versioned("id", "0.0.4"), versioned("id", "0.0.4")])
        .await;
    assert!(matches!(
        duplicate,
        Err(ReconcileError::Validation(ValidationError::DuplicateId { .. }))
    ));

    let bad_version = Reconciler::new(&store)
        .reconcile(vec![versioned("ok", "1.0.0"), versioned("myjobid", "thisisbadversion")])
        .await;
    assert!(matches!(
        bad_version,
        Err(ReconcileError::Validation(ValidationError::InvalidVersion { .. }))
    ));

    let no_options = Reconciler::new(&store)
        .reconcile(vec![JobConfig {
            data: JobData::from(json!({"_version": "0.0.4"})),
            ..JobConfig::default()
        }])
        .await;
    assert!(matches!(
        no_options,
        Err(ReconcileError::Validation(ValidationError::MissingOptions { index: 0 }))
    ));

    assert!(stored_ids(&store).await.is_empty());
}

/// Test: A schedule that never fires is rejected before pruning runs.
#[tokio::test]
async fn test_unschedulable_repeat_leaves_queue_untouched() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![versioned("old", "1.0.0")], false).await;

    let result = Reconciler::new(&store)
        .with_prune(true)
        .reconcile(vec![
            versioned("a", "1.0.0"),
            JobConfig::new("feb30", json!({})).with_repeat(RepeatOptions::cron("0 0 30 2 *")),
        ])
        .await;
    assert!(matches!(
        result,
        Err(ReconcileError::Validation(ValidationError::InvalidRepeat { .. }))
    ));
    assert_eq!(stored_ids(&store).await, vec!["old"]);
}

/// Test: A higher version replaces the stored job, options included.
#[tokio::test]
async fn test_higher_version_replaces() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![versioned("myjobid", "0.0.4")], false).await;
    apply(
        &store,
        vec![versioned("myjobid", "0.0.5").with_attempts(5).with_delay(8)],
        false,
    )
    .await;

    assert_eq!(stored_version(&store, "myjobid").await.as_deref(), Some("0.0.5"));
    let job = store.get_job(&JobId::new("myjobid")).await.unwrap().unwrap();
    assert_eq!(job.options.attempts, Some(5));
    assert_eq!(job.options.delay, Some(8));
}

/// Test: A lower version is blocked unless forced.
#[tokio::test]
async fn test_lower_version_needs_force() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![versioned("myjobid", "0.0.5")], false).await;

    let summary = Reconciler::new(&store)
        .reconcile(vec![versioned("myjobid", "0.0.4")])
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(stored_version(&store, "myjobid").await.as_deref(), Some("0.0.5"));

    apply(
        &store,
        vec![versioned("myjobid", "0.0.4").with_force(true)],
        false,
    )
    .await;
    assert_eq!(stored_version(&store, "myjobid").await.as_deref(), Some("0.0.4"));
}

/// Test: A stored job without a version is always replaced.
#[tokio::test]
async fn test_unversioned_stored_job_is_replaced() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![unversioned("myjobid")], false).await;
    apply(
        &store,
        vec![unversioned("myjobid").with_attempts(5).with_delay(8)],
        false,
    )
    .await;

    let job = store.get_job(&JobId::new("myjobid")).await.unwrap().unwrap();
    assert_eq!(job.version(), None);
    assert_eq!(job.options.attempts, Some(5));

    apply(&store, vec![versioned("myjobid", "0.0.1")], false).await;
    assert_eq!(stored_version(&store, "myjobid").await.as_deref(), Some("0.0.1"));
}

/// Test: Extra jobs survive unless pruning is on.
#[tokio::test]
async fn test_prune_flag() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![versioned("myjobid", "0.0.4")], false).await;

    apply(&store, vec![versioned("other", "0.0.4")], false).await;
    assert_eq!(stored_ids(&store).await, vec!["myjobid", "other"]);

    let summary = Reconciler::new(&store)
        .with_prune(true)
        .reconcile(vec![versioned("other", "0.0.4")])
        .await
        .unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(stored_ids(&store).await, vec!["other"]);
}

/// Test: Pruning removes extra repeatable registrations with their instances.
#[tokio::test]
async fn test_prune_removes_repeatables() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![repeating("extraJob", 5)], false).await;
    assert_eq!(store.list_repeatables().await.unwrap().len(), 1);

    apply(&store, vec![repeating("myjobid", 8)], true).await;

    let jobs = store.list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, JobId::new("myjobid"));
    assert_eq!(
        jobs[0].options.repeat.as_ref().map(|r| &r.interval),
        Some(&RepeatInterval::Every { every: 8 })
    );

    let repeatables = store.list_repeatables().await.unwrap();
    assert_eq!(repeatables.len(), 1);
    assert_eq!(repeatables[0].id, JobId::new("myjobid"));
    assert_eq!(repeatables[0].interval, RepeatInterval::Every { every: 8 });
}

/// Test: Changing the interval leaves exactly one registration.
#[tokio::test]
async fn test_repeatable_retargeting() {
    let store = InMemoryQueueStore::new();
    apply(
        &store,
        vec![
            JobConfig::new("myjobid", json!({"_version": "0.0.4", "a": "g"}))
                .with_repeat(RepeatOptions::every(5)),
        ],
        false,
    )
    .await;

    let repeatables = store.list_repeatables().await.unwrap();
    assert_eq!(repeatables.len(), 1);
    assert_eq!(repeatables[0].interval, RepeatInterval::Every { every: 5 });

    let summary = Reconciler::new(&store)
        .reconcile(vec![
            JobConfig::new("myjobid", json!({"_version": "0.0.5", "a": "g"}))
                .with_repeat(RepeatOptions::every(8)),
        ])
        .await
        .unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.repeatables_removed, 1);

    let repeatables = store.list_repeatables().await.unwrap();
    assert_eq!(repeatables.len(), 1);
    assert_eq!(repeatables[0].id, JobId::new("myjobid"));
    assert_eq!(repeatables[0].interval, RepeatInterval::Every { every: 8 });
    assert_eq!(store.list_jobs().await.unwrap().len(), 1);
}

/// Test: Dropping the repeat descriptor removes the registration.
#[tokio::test]
async fn test_repeat_dropped() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![repeating("r", 5)], false).await;
    apply(&store, vec![unversioned("r")], false).await;

    assert!(store.list_repeatables().await.unwrap().is_empty());
    let job = store.get_job(&JobId::new("r")).await.unwrap().unwrap();
    assert!(job.options.repeat.is_none());
    assert_eq!(stored_ids(&store).await, vec!["r"]);
}

/// Test: Adding a repeat descriptor replaces the plain job under that id.
#[tokio::test]
async fn test_repeat_added() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![JobConfig::new("x", json!({"_version": "1.0.0", "v": "old"}))], false).await;
    apply(
        &store,
        vec![
            JobConfig::new("x", json!({"_version": "2.0.0", "v": "new"}))
                .with_repeat(RepeatOptions::every(5000)),
        ],
        false,
    )
    .await;

    let jobs = store.list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, JobId::new("x"));
    assert_eq!(jobs[0].data, JobData::from(json!({"_version": "2.0.0", "v": "new"})));
    assert_eq!(store.list_repeatables().await.unwrap().len(), 1);
}

/// Test: An update keeps the creation timestamp.
#[tokio::test]
async fn test_update_preserves_timestamp() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![versioned("myjobid", "0.0.4")], false).await;
    let before = store.get_job(&JobId::new("myjobid")).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    apply(&store, vec![versioned("myjobid", "0.0.5")], false).await;
    let after = store.get_job(&JobId::new("myjobid")).await.unwrap().unwrap();

    assert_eq!(after.version().map(|v| v.to_string()).as_deref(), Some("0.0.5"));
    assert_eq!(after.timestamp, before.timestamp);
}

/// Test: An active job keeps its state when updated.
#[tokio::test]
async fn test_update_keeps_active_state() {
    let store = InMemoryQueueStore::new();
    apply(&store, vec![versioned("busy", "1.0.0")], false).await;
    assert!(store.set_state(&JobId::new("busy"), JobState::Active).unwrap());

    apply(&store, vec![versioned("busy", "1.1.0")], false).await;
    let job = store.get_job(&JobId::new("busy")).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Active);
    assert_eq!(stored_version(&store, "busy").await.as_deref(), Some("1.1.0"));
}

/// Test: Large sets reconcile in bounded time with the expected counts.
#[tokio::test]
async fn test_large_set() {
    let store = InMemoryQueueStore::new();
    let count = 10_000;

    let started = Instant::now();
    apply(&store, many("i", count / 2), false).await;

    let mut desired = vec![
        versioned("d1", "1.0.0").with_delay(3600),
        versioned("d2", "1.0.0").with_delay(8),
    ];
    desired.extend(
        (0..count).map(|i| JobConfig::new(format!("i{}", i), json!({"_version": "1.0.1"}))),
    );
    let summary = Reconciler::new(&store).reconcile(desired).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.updated, count / 2);
    assert_eq!(summary.created, count / 2 + 2);

    let counts = counts(&store).await;
    assert_eq!(counts.waiting, count);
    assert_eq!(counts.delayed, 2);
    assert_eq!(counts.active, 0);
    assert_eq!(counts.completed, 0);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.paused, 0);
    assert!(elapsed < Duration::from_secs(15), "took {:?}", elapsed);
}
