//! In-memory queue store.
//!
//! Provides a thread-safe in-memory backend for testing and development.
//! Behaves like a persistent queue: jobs upsert by id, repeatable
//! registrations are keyed by id and interval, and each registration keeps
//! one pending instance.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{JobCounts, QueueInspector, QueueStore, StoreError, instance_key, latest, next_run};
use crate::core::job::{ExistingJob, JobState, RepeatableDescriptor, ValidatedJob};
use crate::core::types::JobId;

/// In-memory queue store.
///
/// Data is not persisted across restarts.
pub struct InMemoryQueueStore {
    jobs: RwLock<HashMap<String, ExistingJob>>,
    repeatables: RwLock<HashMap<String, RepeatableDescriptor>>,
    /// Registration key to the store key of its pending instance.
    pending: RwLock<HashMap<String, String>>,
}

impl InMemoryQueueStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            repeatables: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Move a plain job to another state, as a worker would.
    ///
    /// Returns `false` when no job is stored under `id`.
    pub fn set_state(&self, id: &JobId, state: JobState) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        match jobs.get_mut(id.as_str()) {
            Some(job) => {
                job.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Overwrite name, data and options in place; timestamp and key survive.
fn overwrite(existing: &mut ExistingJob, job: &ValidatedJob) {
    existing.name = job.name.clone();
    existing.data = job.data.clone();
    existing.options = job.options.clone();
    if existing.state != JobState::Active {
        existing.state = JobState::initial(&job.options);
    }
}

fn is_pending(job: &ExistingJob) -> bool {
    matches!(job.state, JobState::Waiting | JobState::Delayed)
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn list_jobs(&self) -> Result<Vec<ExistingJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut result: Vec<_> = jobs.values().cloned().collect();
        result.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key.cmp(&b.key)));
        Ok(result)
    }

    async fn list_repeatables(&self) -> Result<Vec<RepeatableDescriptor>, StoreError> {
        let repeatables = self
            .repeatables
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        let mut result: Vec<_> = repeatables.values().cloned().collect();
        result.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }

    async fn add_jobs_bulk(&self, batch: &[ValidatedJob]) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut repeatables = self
            .repeatables
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let mut pending = self.pending.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Utc::now();

        for job in batch {
            let Some(repeat) = job.repeat() else {
                match jobs.get_mut(job.id.as_str()) {
                    Some(existing) => overwrite(existing, job),
                    None => {
                        jobs.insert(
                            job.id.as_str().to_string(),
                            ExistingJob {
                                id: job.id.clone(),
                                key: job.id.as_str().to_string(),
                                name: job.name.clone(),
                                data: job.data.clone(),
                                options: job.options.clone(),
                                timestamp: now,
                                state: JobState::initial(&job.options),
                            },
                        );
                    }
                }
                continue;
            };

            let registration =
                RepeatableDescriptor::key_for(job.name.as_deref(), &job.id, &repeat.interval);
            let next = match repeatables.get(&registration) {
                Some(descriptor) => descriptor.next,
                None => {
                    let next = next_run(job, &repeat.interval, now)?;
                    repeatables.insert(
                        registration.clone(),
                        RepeatableDescriptor {
                            key: registration.clone(),
                            id: job.id.clone(),
                            name: job.name.clone(),
                            interval: repeat.interval.clone(),
                            next,
                        },
                    );
                    next
                }
            };

            // A plain job under the same id is superseded by the schedule.
            if jobs
                .get(job.id.as_str())
                .is_some_and(|plain| plain.state != JobState::Active)
            {
                jobs.remove(job.id.as_str());
            }

            let instance = match pending.get(&registration) {
                Some(key) => jobs.get_mut(key).filter(|existing| is_pending(existing)),
                None => None,
            };
            match instance {
                Some(existing) => overwrite(existing, job),
                None => {
                    let key = instance_key(&registration, next);
                    pending.insert(registration.clone(), key.clone());
                    jobs.insert(
                        key.clone(),
                        ExistingJob {
                            id: job.id.clone(),
                            key,
                            name: job.name.clone(),
                            data: job.data.clone(),
                            options: job.options.clone(),
                            timestamp: now,
                            state: JobState::Delayed,
                        },
                    );
                }
            }
        }

        tracing::trace!(count = batch.len(), "Added jobs to in-memory queue");
        Ok(())
    }

    async fn remove_jobs_bulk(&self, ids: &[JobId]) -> Result<(), StoreError> {
        let ids: HashSet<&JobId> = ids.iter().collect();
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut pending = self.pending.write().map_err(|_| StoreError::LockPoisoned)?;
        jobs.retain(|_, job| !ids.contains(&job.id));
        pending.retain(|_, key| jobs.contains_key(key));
        Ok(())
    }

    async fn remove_repeatable(
        &self,
        id: &JobId,
        descriptor: &RepeatableDescriptor,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut repeatables = self
            .repeatables
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let mut pending = self.pending.write().map_err(|_| StoreError::LockPoisoned)?;

        repeatables.remove(&descriptor.key);
        if let Some(key) = pending.remove(&descriptor.key)
            && jobs
                .get(&key)
                .is_some_and(|job| &job.id == id && is_pending(job))
        {
            jobs.remove(&key);
        }
        Ok(())
    }
}

#[async_trait]
impl QueueInspector for InMemoryQueueStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<ExistingJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(latest(jobs.values(), id).cloned())
    }

    async fn job_counts(&self) -> Result<JobCounts, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            counts.record(job.state);
        }
        Ok(counts)
    }
}
