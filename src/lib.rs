//! jobsync - declarative job-queue reconciliation.
//!
//! Declare the jobs a queue should hold; [`reconcile`] brings the queue in
//! line, replacing stored jobs only when the declared version is newer.

pub mod config;
pub mod core;
pub mod reconcile;
pub mod store;
pub mod testing;

pub use config::{ConfigError, DesiredSet, YamlLoader};
pub use crate::core::job::{
    BackoffKind, BackoffOptions, ExistingJob, JobConfig, JobData, JobOptions, JobState,
    RepeatInterval, RepeatOptions, RepeatableDescriptor, ValidatedJob,
};
pub use crate::core::schedule::{Schedule, ScheduleError};
pub use crate::core::types::{JobId, RunId};
pub use crate::core::version::{ReplaceDecision, VERSION_FIELD, compare};
pub use reconcile::{
    QueueSnapshot, ReconcileError, ReconcileSummary, ReconciliationPlan, Reconciler,
    ValidationError, plan, reconcile, validate,
};
pub use store::{
    BackendConnector, InMemoryConnector, InMemoryQueueStore, JobCounts, QueueInspector,
    QueueStore, StoreConnector, StoreError, StoreOptions,
};
#[cfg(feature = "sqlite")]
pub use store::{SqliteConnector, SqliteQueueStore};
