//! Queue store abstraction.
//!
//! The reconciliation engine only talks to a queue through the narrow
//! [`QueueStore`] trait. Backends (in-memory, SQLite) implement it, and a
//! [`StoreConnector`] turns a queue name plus opaque [`StoreOptions`] into a
//! store handle owned by the caller.

mod connector;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use connector::{BackendConnector, InMemoryConnector, StoreConnector};
pub use memory::InMemoryQueueStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnector, SqliteQueueStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::job::{
    ExistingJob, JobState, RepeatInterval, RepeatableDescriptor, ValidatedJob,
};
use crate::core::schedule::Schedule;
use crate::core::types::JobId;

/// Errors surfaced by a queue store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not reach or open the backing store.
    #[error("connection error: {0}")]
    Connection(String),

    /// Store lock was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Connector options were not understood.
    #[error("invalid store options: {0}")]
    InvalidOptions(String),

    /// A job could not be accepted.
    #[error("invalid job '{id}': {reason}")]
    InvalidJob { id: String, reason: String },

    /// Generic backend error.
    #[error("store error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Opaque connector configuration, forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreOptions(Map<String, Value>);

impl StoreOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for StoreOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
}

impl JobCounts {
    /// Count one job in `state`.
    pub fn record(&mut self, state: JobState) {
        self.add(state, 1);
    }

    /// Count `n` jobs in `state`.
    pub fn add(&mut self, state: JobState, n: usize) {
        let slot = match state {
            JobState::Waiting => &mut self.waiting,
            JobState::Delayed => &mut self.delayed,
            JobState::Active => &mut self.active,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Paused => &mut self.paused,
        };
        *slot += n;
    }

    /// Total number of jobs.
    pub fn total(&self) -> usize {
        self.waiting + self.delayed + self.active + self.completed + self.failed + self.paused
    }
}

/// The store contract consumed by the reconciliation engine.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// List every job held by the queue.
    async fn list_jobs(&self) -> Result<Vec<ExistingJob>, StoreError>;

    /// List the standing repeatable registrations.
    async fn list_repeatables(&self) -> Result<Vec<RepeatableDescriptor>, StoreError>;

    /// Add jobs, upserting by id.
    ///
    /// An existing job keeps its creation timestamp and gets the new name,
    /// data and options. A job with a repeat descriptor registers the
    /// schedule (if not already registered under the same interval) and
    /// upserts its pending instance.
    async fn add_jobs_bulk(&self, jobs: &[ValidatedJob]) -> Result<(), StoreError>;

    /// Remove every job, repeat instances included, whose id is listed.
    /// Repeatable registrations are left alone.
    async fn remove_jobs_bulk(&self, ids: &[JobId]) -> Result<(), StoreError>;

    /// Remove a repeatable registration and its pending instance.
    async fn remove_repeatable(
        &self,
        id: &JobId,
        descriptor: &RepeatableDescriptor,
    ) -> Result<(), StoreError>;
}

/// Read access used by tests and the CLI to look at a queue.
#[async_trait]
pub trait QueueInspector: Send + Sync {
    /// Get the most recent job with the given id.
    async fn get_job(&self, id: &JobId) -> Result<Option<ExistingJob>, StoreError>;

    /// Count jobs per state.
    async fn job_counts(&self) -> Result<JobCounts, StoreError>;
}

/// Time of the next instance of a repeatable job.
pub(crate) fn next_run(
    job: &ValidatedJob,
    interval: &RepeatInterval,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, StoreError> {
    Schedule::from_interval(interval)
        .and_then(|schedule| schedule.next_after(now))
        .map_err(|e| StoreError::InvalidJob {
            id: job.id.to_string(),
            reason: e.to_string(),
        })
}

/// Store key of the pending instance of a registration.
pub(crate) fn instance_key(registration: &str, next: DateTime<Utc>) -> String {
    format!("{}{}", instance_prefix(registration), next.timestamp_millis())
}

/// Key prefix shared by every instance of a registration.
pub(crate) fn instance_prefix(registration: &str) -> String {
    format!("repeat:{}:", registration)
}

/// Most recent job with the given id.
pub(crate) fn latest<'a>(
    jobs: impl IntoIterator<Item = &'a ExistingJob>,
    id: &JobId,
) -> Option<&'a ExistingJob> {
    jobs.into_iter()
        .filter(|job| &job.id == id)
        .max_by_key(|job| job.timestamp)
}
