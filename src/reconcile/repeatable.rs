//! Repeatable registration bookkeeping.
//!
//! Adding a job with a new interval registers a second schedule next to
//! the old one rather than replacing it. Registrations that no longer match
//! their job must be removed explicitly before the add.

use super::diff::ReconciliationPlan;
use super::snapshot::QueueSnapshot;
use crate::core::job::{RepeatableDescriptor, ValidatedJob};

/// Registrations the plan makes stale.
///
/// - A created or updated job keeps only a registration matching its own
///   name and interval. Everything else under its id goes, including all
///   registrations when it no longer repeats.
/// - A deleted id loses every registration.
pub fn stale_registrations(
    plan: &ReconciliationPlan,
    snapshot: &QueueSnapshot,
) -> Vec<RepeatableDescriptor> {
    let mut stale = Vec::new();

    for job in plan.to_create.iter().chain(&plan.to_update) {
        stale.extend(
            snapshot
                .repeatables_for(&job.id)
                .filter(|registration| !matches_job(registration, job))
                .cloned(),
        );
    }

    for id in &plan.to_delete {
        stale.extend(snapshot.repeatables_for(id).cloned());
    }

    stale
}

fn matches_job(registration: &RepeatableDescriptor, job: &ValidatedJob) -> bool {
    job.repeat().is_some_and(|repeat| {
        registration.interval == repeat.interval && registration.name == job.name
    })
}
