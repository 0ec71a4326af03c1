//! Reconciliation engine.
//!
//! Brings a queue in line with a declared set of jobs:
//!
//! 1. validate the whole desired set,
//! 2. read a snapshot of the queue,
//! 3. diff desired against stored jobs behind the version gate,
//! 4. work out which repeatable registrations go stale,
//! 5. apply everything in a few bulk store calls.
//!
//! Reconciliation is idempotent: running the same desired set twice leaves
//! the queue unchanged the second time.

mod diff;
mod executor;
mod repeatable;
mod snapshot;
mod validator;

pub use diff::{PlanCounts, ReconciliationPlan, diff};
pub use executor::BatchExecutor;
pub use repeatable::stale_registrations;
pub use snapshot::QueueSnapshot;
pub use validator::{ValidationError, validate};

use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::job::{JobConfig, ValidatedJob};
use crate::core::types::RunId;
use crate::store::{QueueStore, StoreConnector, StoreError, StoreOptions};

/// Errors from a reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired set was rejected. The queue was not touched.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A store call failed. Earlier phases may have been applied.
    #[error("queue store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of a reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileSummary {
    /// Identifier for this run, carried in log lines.
    pub run_id: RunId,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub repeatables_removed: usize,
    /// Wall time from snapshot to last store call.
    pub elapsed: Duration,
}

impl ReconcileSummary {
    fn from_counts(run_id: RunId, counts: PlanCounts, elapsed: Duration) -> Self {
        Self {
            run_id,
            created: counts.created,
            updated: counts.updated,
            skipped: counts.skipped,
            deleted: counts.deleted,
            repeatables_removed: counts.repeatables_removed,
            elapsed,
        }
    }

    /// Whether the run changed anything.
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.deleted + self.repeatables_removed > 0
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} deleted, {} repeatables removed",
            self.created, self.updated, self.skipped, self.deleted, self.repeatables_removed
        )
    }
}

/// Reconciles desired sets against one store.
///
/// The store is borrowed; opening and closing it is the caller's business.
pub struct Reconciler<'a> {
    store: &'a dyn QueueStore,
    prune: bool,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler. Pruning is off.
    pub fn new(store: &'a dyn QueueStore) -> Self {
        Self {
            store,
            prune: false,
        }
    }

    /// Delete stored jobs absent from the desired set.
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Compute the plan for `desired` without applying it.
    pub async fn plan(&self, desired: Vec<JobConfig>) -> Result<ReconciliationPlan, ReconcileError> {
        let validated = validate_logged(desired)?;
        self.plan_validated(validated).await
    }

    /// Compute the plan for an already validated desired set.
    pub async fn plan_validated(
        &self,
        desired: Vec<ValidatedJob>,
    ) -> Result<ReconciliationPlan, ReconcileError> {
        let snapshot = QueueSnapshot::read(self.store).await?;
        Ok(ReconciliationPlan::compute(desired, &snapshot, self.prune))
    }

    /// Validate `desired` and apply it.
    pub async fn reconcile(
        &self,
        desired: Vec<JobConfig>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let validated = validate_logged(desired)?;
        self.apply(validated).await
    }

    /// Apply an already validated desired set.
    pub async fn apply(
        &self,
        desired: Vec<ValidatedJob>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let run_id = RunId::new();
        let started = Instant::now();

        let snapshot = QueueSnapshot::read(self.store).await?;
        tracing::debug!(
            run_id = %run_id,
            jobs = snapshot.job_count(),
            repeatables = snapshot.repeatables().len(),
            "Read queue snapshot"
        );

        let plan = ReconciliationPlan::compute(desired, &snapshot, self.prune);
        let counts = plan.counts();
        tracing::debug!(
            run_id = %run_id,
            create = counts.created,
            update = counts.updated,
            skip = counts.skipped,
            delete = counts.deleted,
            repeatables = counts.repeatables_removed,
            "Computed reconciliation plan"
        );

        if let Err(e) = BatchExecutor::new(self.store).execute(plan).await {
            tracing::warn!(run_id = %run_id, error = %e, "Reconciliation halted by store error");
            return Err(e.into());
        }

        let summary = ReconcileSummary::from_counts(run_id, counts, started.elapsed());
        tracing::info!(
            run_id = %summary.run_id,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            deleted = summary.deleted,
            repeatables_removed = summary.repeatables_removed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Reconciliation complete"
        );
        Ok(summary)
    }
}

fn validate_logged(desired: Vec<JobConfig>) -> Result<Vec<ValidatedJob>, ValidationError> {
    validate(desired).inspect_err(|e| {
        tracing::warn!(error = %e, "Rejected desired job set");
    })
}

/// Reconcile `queue` against `desired`.
///
/// The desired set is validated before the connector is asked for a store,
/// so an invalid set never opens a connection.
pub async fn reconcile<C>(
    connector: &C,
    queue: &str,
    options: &StoreOptions,
    desired: Vec<JobConfig>,
    prune: bool,
) -> Result<ReconcileSummary, ReconcileError>
where
    C: StoreConnector + ?Sized,
{
    let validated = validate_logged(desired)?;
    let store = connector.connect(queue, options).await?;
    tracing::debug!(queue = %queue, "Connected to queue store");
    Reconciler::new(store.as_ref())
        .with_prune(prune)
        .apply(validated)
        .await
}

/// Compute the plan for `queue` without applying it.
///
/// Validation runs before the connector is asked for a store.
pub async fn plan<C>(
    connector: &C,
    queue: &str,
    options: &StoreOptions,
    desired: Vec<JobConfig>,
    prune: bool,
) -> Result<ReconciliationPlan, ReconcileError>
where
    C: StoreConnector + ?Sized,
{
    let validated = validate_logged(desired)?;
    let store = connector.connect(queue, options).await?;
    Reconciler::new(store.as_ref())
        .with_prune(prune)
        .plan_validated(validated)
        .await
}
