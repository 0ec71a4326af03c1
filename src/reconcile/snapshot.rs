//! Point-in-time view of a queue.

use std::collections::{BTreeSet, HashMap};

use crate::core::job::{ExistingJob, RepeatableDescriptor};
use crate::core::types::JobId;
use crate::store::{QueueStore, StoreError};

/// What the queue held when a reconciliation started.
///
/// When several stored jobs share an id (repeat instances), only the most
/// recent one is kept.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    jobs: HashMap<JobId, ExistingJob>,
    repeatables: Vec<RepeatableDescriptor>,
}

impl QueueSnapshot {
    /// Read the jobs and repeatable registrations of a store.
    pub async fn read(store: &dyn QueueStore) -> Result<Self, StoreError> {
        let jobs = store.list_jobs().await?;
        let repeatables = store.list_repeatables().await?;
        Ok(Self::from_parts(jobs, repeatables))
    }

    /// Build a snapshot from listed jobs and registrations.
    pub fn from_parts(jobs: Vec<ExistingJob>, repeatables: Vec<RepeatableDescriptor>) -> Self {
        let mut by_id: HashMap<JobId, ExistingJob> = HashMap::with_capacity(jobs.len());
        for job in jobs {
            match by_id.get(&job.id) {
                Some(current) if current.timestamp >= job.timestamp => {}
                _ => {
                    by_id.insert(job.id.clone(), job);
                }
            }
        }
        Self {
            jobs: by_id,
            repeatables,
        }
    }

    /// Most recent stored job with `id`.
    pub fn job(&self, id: &JobId) -> Option<&ExistingJob> {
        self.jobs.get(id)
    }

    /// Registrations producing instances for `id`.
    pub fn repeatables_for<'a>(
        &'a self,
        id: &'a JobId,
    ) -> impl Iterator<Item = &'a RepeatableDescriptor> + 'a {
        self.repeatables.iter().filter(move |r| &r.id == id)
    }

    /// All registrations.
    pub fn repeatables(&self) -> &[RepeatableDescriptor] {
        &self.repeatables
    }

    /// Every id known to the queue, from jobs and registrations, sorted.
    pub fn ids(&self) -> BTreeSet<&JobId> {
        self.jobs
            .keys()
            .chain(self.repeatables.iter().map(|r| &r.id))
            .collect()
    }

    /// Number of distinct job ids held.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.repeatables.is_empty()
    }
}
