//! Testing utilities for users of the jobsync library.
//!
//! - [`RecordingStore`]: wraps a store, records every call in order, and
//!   can fail a chosen operation
//! - [`StoreCall`]: one recorded call
//! - [`StoreOp`]: the operation kinds a failure can be injected on

use async_trait::async_trait;
use std::sync::RwLock;

use crate::core::job::{ExistingJob, RepeatableDescriptor, ValidatedJob};
use crate::core::types::JobId;
use crate::store::{JobCounts, QueueInspector, QueueStore, StoreError};

/// Kinds of store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListJobs,
    ListRepeatables,
    AddJobs,
    RemoveJobs,
    RemoveRepeatable,
}

/// A store call as seen by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListJobs,
    ListRepeatables,
    /// Ids of the batch, in order.
    AddJobs(Vec<JobId>),
    RemoveJobs(Vec<JobId>),
    /// Job id and registration key.
    RemoveRepeatable(JobId, String),
}

impl StoreCall {
    /// Operation kind of this call.
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::ListJobs => StoreOp::ListJobs,
            StoreCall::ListRepeatables => StoreOp::ListRepeatables,
            StoreCall::AddJobs(_) => StoreOp::AddJobs,
            StoreCall::RemoveJobs(_) => StoreOp::RemoveJobs,
            StoreCall::RemoveRepeatable(_, _) => StoreOp::RemoveRepeatable,
        }
    }

    /// Whether the call changes the queue.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, StoreCall::ListJobs | StoreCall::ListRepeatables)
    }
}

/// A store wrapper that records calls.
///
/// # Example
///
/// ```
/// use jobsync::store::InMemoryQueueStore;
/// use jobsync::testing::{RecordingStore, StoreOp};
///
/// let store = RecordingStore::new(InMemoryQueueStore::new())
///     .failing_on(StoreOp::AddJobs);
/// assert!(store.calls().is_empty());
/// ```
pub struct RecordingStore<S> {
    inner: S,
    calls: RwLock<Vec<StoreCall>>,
    fail_on: Option<StoreOp>,
}

impl<S> RecordingStore<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: RwLock::new(Vec::new()),
            fail_on: None,
        }
    }

    /// Fail every call of kind `op` with a backend error. The call is still
    /// recorded; the wrapped store is not reached.
    pub fn failing_on(mut self, op: StoreOp) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().expect("lock poisoned").clone()
    }

    /// Calls that change the queue.
    pub fn mutations(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(StoreCall::is_mutation)
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.write().expect("lock poisoned").clear();
    }

    fn record(&self, call: StoreCall) -> Result<(), StoreError> {
        let op = call.op();
        self.calls
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(call);
        if self.fail_on == Some(op) {
            return Err(StoreError::Backend(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: QueueStore> QueueStore for RecordingStore<S> {
    async fn list_jobs(&self) -> Result<Vec<ExistingJob>, StoreError> {
        self.record(StoreCall::ListJobs)?;
        self.inner.list_jobs().await
    }

    async fn list_repeatables(&self) -> Result<Vec<RepeatableDescriptor>, StoreError> {
        self.record(StoreCall::ListRepeatables)?;
        self.inner.list_repeatables().await
    }

    async fn add_jobs_bulk(&self, jobs: &[ValidatedJob]) -> Result<(), StoreError> {
        self.record(StoreCall::AddJobs(
            jobs.iter().map(|job| job.id.clone()).collect(),
        ))?;
        self.inner.add_jobs_bulk(jobs).await
    }

    async fn remove_jobs_bulk(&self, ids: &[JobId]) -> Result<(), StoreError> {
        self.record(StoreCall::RemoveJobs(ids.to_vec()))?;
        self.inner.remove_jobs_bulk(ids).await
    }

    async fn remove_repeatable(
        &self,
        id: &JobId,
        descriptor: &RepeatableDescriptor,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::RemoveRepeatable(
            id.clone(),
            descriptor.key.clone(),
        ))?;
        self.inner.remove_repeatable(id, descriptor).await
    }
}

#[async_trait]
impl<S: QueueInspector> QueueInspector for RecordingStore<S> {
    async fn get_job(&self, id: &JobId) -> Result<Option<ExistingJob>, StoreError> {
        self.inner.get_job(id).await
    }

    async fn job_counts(&self) -> Result<JobCounts, StoreError> {
        self.inner.job_counts().await
    }
}
