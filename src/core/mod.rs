//! Core domain types: identifiers, job definitions, versions and schedules.

pub mod job;
pub mod schedule;
pub mod types;
pub mod version;
