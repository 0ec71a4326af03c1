//! Batch executor.
//!
//! Applies a plan in a fixed order: stale registrations, then one bulk
//! removal, then one bulk add. The first store failure stops execution;
//! nothing is retried.

use super::diff::ReconciliationPlan;
use crate::store::{QueueStore, StoreError};

/// Applies plans to a store.
pub struct BatchExecutor<'a> {
    store: &'a dyn QueueStore,
}

impl<'a> BatchExecutor<'a> {
    /// Create an executor for `store`.
    pub fn new(store: &'a dyn QueueStore) -> Self {
        Self { store }
    }

    /// Apply `plan`. Empty groups issue no store call.
    pub async fn execute(&self, plan: ReconciliationPlan) -> Result<(), StoreError> {
        for registration in &plan.repeatables_to_remove {
            tracing::debug!(id = %registration.id, key = %registration.key, "Removing repeatable registration");
            self.store
                .remove_repeatable(&registration.id, registration)
                .await?;
        }

        if !plan.to_delete.is_empty() {
            tracing::debug!(count = plan.to_delete.len(), "Removing jobs");
            self.store.remove_jobs_bulk(&plan.to_delete).await?;
        }

        let mut batch = plan.to_create;
        batch.extend(plan.to_update);
        if !batch.is_empty() {
            tracing::debug!(count = batch.len(), "Adding jobs");
            self.store.add_jobs_bulk(&batch).await?;
        }

        Ok(())
    }
}
