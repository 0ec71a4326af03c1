//! Version tags and the replacement rule.
//!
//! A job's payload may carry a `_version` field holding a semantic version.
//! The version decides whether a desired configuration is allowed to replace
//! the job already sitting in the queue.

use semver::Version;
use std::cmp::Ordering;

/// Field of a record payload holding the version tag.
pub const VERSION_FIELD: &str = "_version";

/// Outcome of comparing an existing job against its desired replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceDecision {
    /// The desired configuration replaces the existing job.
    Allow,
    /// The existing job is left untouched.
    Block,
}

impl ReplaceDecision {
    /// Whether replacement is allowed.
    pub fn is_allowed(self) -> bool {
        matches!(self, ReplaceDecision::Allow)
    }
}

/// Parse a version tag.
pub fn parse_version(raw: &str) -> Result<Version, semver::Error> {
    Version::parse(raw.trim())
}

/// Decide whether `desired` may replace `existing`.
///
/// - `force` allows unconditionally, downgrades included.
/// - An unversioned existing job carries no protection.
/// - An unversioned desired configuration is always allowed.
/// - Otherwise the desired version must be strictly greater. Build metadata
///   takes no part in the ordering.
pub fn compare(
    existing: Option<&Version>,
    desired: Option<&Version>,
    force: bool,
) -> ReplaceDecision {
    if force {
        return ReplaceDecision::Allow;
    }

    match (existing, desired) {
        (Some(existing), Some(desired))
            if desired.cmp_precedence(existing) != Ordering::Greater =>
        {
            ReplaceDecision::Block
        }
        _ => ReplaceDecision::Allow,
    }
}
