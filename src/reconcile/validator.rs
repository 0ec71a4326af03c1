//! Desired-set validation.
//!
//! The whole batch is checked before anything touches the queue: one bad
//! entry rejects the entire reconciliation.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use crate::core::job::{JobConfig, ValidatedJob};
use crate::core::schedule::Schedule;
use crate::core::types::JobId;
use crate::core::version::parse_version;

/// A desired configuration that cannot be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The entry has no options block.
    #[error("job at index {index} has no options")]
    MissingOptions { index: usize },

    /// The options block has no id.
    #[error("job at index {index} has no id")]
    MissingId { index: usize },

    /// Two entries share an id.
    #[error("duplicate job id: {id}")]
    DuplicateId { id: String },

    /// The `_version` tag is not a valid semantic version.
    #[error("job '{id}' has invalid version '{version}': {reason}")]
    InvalidVersion {
        id: String,
        version: String,
        reason: String,
    },

    /// The repeat descriptor cannot be scheduled.
    #[error("job '{id}' has invalid repeat options: {reason}")]
    InvalidRepeat { id: String, reason: String },
}

/// Validate a desired set.
///
/// Returns every entry, in order, with its id and version extracted. A
/// top-level `force` flag is folded into the options.
pub fn validate(configs: Vec<JobConfig>) -> Result<Vec<ValidatedJob>, ValidationError> {
    let mut seen: HashSet<JobId> = HashSet::with_capacity(configs.len());
    let mut validated = Vec::with_capacity(configs.len());

    for (index, config) in configs.into_iter().enumerate() {
        let JobConfig {
            name,
            data,
            options,
            force,
        } = config;

        let mut options = options.ok_or(ValidationError::MissingOptions { index })?;
        let id = match options.id.as_deref() {
            Some(id) if !id.trim().is_empty() => JobId::new(id),
            _ => return Err(ValidationError::MissingId { index }),
        };

        if !seen.insert(id.clone()) {
            return Err(ValidationError::DuplicateId { id: id.to_string() });
        }

        let version = match data.version_tag() {
            None => None,
            Some(Value::String(raw)) => Some(parse_version(raw).map_err(|e| {
                ValidationError::InvalidVersion {
                    id: id.to_string(),
                    version: raw.clone(),
                    reason: e.to_string(),
                }
            })?),
            Some(other) => {
                return Err(ValidationError::InvalidVersion {
                    id: id.to_string(),
                    version: other.to_string(),
                    reason: "version must be a string".into(),
                });
            }
        };

        if let Some(repeat) = &options.repeat {
            if repeat.limit == Some(0) {
                return Err(ValidationError::InvalidRepeat {
                    id: id.to_string(),
                    reason: "limit must be greater than zero".into(),
                });
            }
            // Reject schedules with no upcoming run.
            Schedule::from_interval(&repeat.interval)
                .and_then(|schedule| schedule.next_after(Utc::now()))
                .map_err(|e| {
                    ValidationError::InvalidRepeat {
                        id: id.to_string(),
                        reason: e.to_string(),
                    }
                })?;
        }

        options.force |= force;
        validated.push(ValidatedJob {
            id,
            version,
            name,
            data,
            options,
        });
    }

    Ok(validated)
}
