//! Desired-vs-actual diff.
//!
//! Each desired job lands in exactly one of create, update or skip. With
//! pruning on, ids the queue holds but the desired set lacks are deleted.

use serde::Serialize;
use std::collections::HashSet;

use super::repeatable;
use super::snapshot::QueueSnapshot;
use crate::core::job::{RepeatableDescriptor, ValidatedJob};
use crate::core::types::JobId;
use crate::core::version::{ReplaceDecision, compare};

/// The mutations a reconciliation will apply.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    /// Desired jobs with no stored counterpart.
    pub to_create: Vec<ValidatedJob>,
    /// Desired jobs allowed to replace their stored counterpart.
    pub to_update: Vec<ValidatedJob>,
    /// Desired jobs blocked by the version gate.
    pub to_skip: Vec<ValidatedJob>,
    /// Stored ids absent from the desired set (pruning only).
    pub to_delete: Vec<JobId>,
    /// Registrations to remove before anything is added.
    pub repeatables_to_remove: Vec<RepeatableDescriptor>,
}

/// Counts of a plan, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub repeatables_removed: usize,
}

impl ReconciliationPlan {
    /// Diff `desired` against `snapshot` and work out which registrations
    /// go stale.
    pub fn compute(desired: Vec<ValidatedJob>, snapshot: &QueueSnapshot, prune: bool) -> Self {
        let mut plan = diff(desired, snapshot, prune);
        plan.repeatables_to_remove = repeatable::stale_registrations(&plan, snapshot);
        plan
    }

    /// Ids of created or updated jobs whose old registrations are replaced.
    pub fn repeatables_to_replace(&self) -> Vec<&JobId> {
        let mut ids: Vec<&JobId> = self
            .to_create
            .iter()
            .chain(&self.to_update)
            .map(|job| &job.id)
            .filter(|id| self.repeatables_to_remove.iter().any(|r| &r.id == *id))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Whether applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty()
            && self.to_update.is_empty()
            && self.to_delete.is_empty()
            && self.repeatables_to_remove.is_empty()
    }

    pub fn counts(&self) -> PlanCounts {
        PlanCounts {
            created: self.to_create.len(),
            updated: self.to_update.len(),
            skipped: self.to_skip.len(),
            deleted: self.to_delete.len(),
            repeatables_removed: self.repeatables_to_remove.len(),
        }
    }
}

/// Classify each desired job and collect prunable ids.
///
/// Desired order is preserved within each bucket. Deletions come out sorted.
pub fn diff(desired: Vec<ValidatedJob>, snapshot: &QueueSnapshot, prune: bool) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    if prune {
        let wanted: HashSet<&JobId> = desired.iter().map(|job| &job.id).collect();
        plan.to_delete = snapshot
            .ids()
            .into_iter()
            .filter(|id| !wanted.contains(id))
            .cloned()
            .collect();
    }

    for job in desired {
        let Some(existing) = snapshot.job(&job.id) else {
            plan.to_create.push(job);
            continue;
        };

        let existing_version = existing.version();
        match compare(existing_version.as_ref(), job.version.as_ref(), job.is_forced()) {
            ReplaceDecision::Allow => plan.to_update.push(job),
            ReplaceDecision::Block => plan.to_skip.push(job),
        }
    }

    plan
}
