//! Job definitions: desired configurations and queue snapshots.
//!
//! A [`JobConfig`] is what callers declare. The validator turns it into a
//! [`ValidatedJob`], the only shape a queue store accepts. An
//! [`ExistingJob`] is a read-only snapshot of a job already stored.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::types::JobId;
use super::version::{VERSION_FIELD, parse_version};

/// Job payload: a string-keyed record or a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobData {
    /// Structured record. May carry a `_version` tag.
    Record(Map<String, Value>),
    /// Sequence payload. Never carries a version.
    Sequence(Vec<Value>),
}

impl Default for JobData {
    fn default() -> Self {
        JobData::Record(Map::new())
    }
}

impl JobData {
    /// Raw `_version` value, if the payload is a record holding one.
    pub fn version_tag(&self) -> Option<&Value> {
        match self {
            JobData::Record(map) => map.get(VERSION_FIELD),
            JobData::Sequence(_) => None,
        }
    }

    /// Parsed version tag. Missing, non-string and malformed tags all read as
    /// `None`.
    pub fn version(&self) -> Option<Version> {
        self.version_tag()
            .and_then(Value::as_str)
            .and_then(|raw| parse_version(raw).ok())
    }

    /// Set the `_version` tag. Sequence payloads are left unchanged.
    pub fn set_version(&mut self, version: impl Into<String>) {
        if let JobData::Record(map) = self {
            map.insert(VERSION_FIELD.to_string(), Value::String(version.into()));
        }
    }
}

impl From<Value> for JobData {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => JobData::Record(map),
            Value::Array(items) => JobData::Sequence(items),
            Value::Null => JobData::default(),
            other => JobData::Sequence(vec![other]),
        }
    }
}

/// Retry backoff strategy applied by the queue store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay between every attempt.
    Fixed,
    /// Delay doubles after every attempt.
    Exponential,
}

/// Backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffOptions {
    /// Strategy.
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    /// Base delay in milliseconds.
    pub delay: u64,
}

/// When a repeatable job fires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepeatInterval {
    /// Fixed interval in milliseconds.
    Every { every: u64 },
    /// Cron expression, evaluated in `tz` (UTC when absent).
    Cron {
        cron: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

impl fmt::Display for RepeatInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatInterval::Every { every } => write!(f, "every {}ms", every),
            RepeatInterval::Cron { cron, tz: Some(tz) } => write!(f, "cron '{}' ({})", cron, tz),
            RepeatInterval::Cron { cron, tz: None } => write!(f, "cron '{}'", cron),
        }
    }
}

/// Repeat descriptor of a recurring job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatOptions {
    /// Interval or cron expression.
    #[serde(flatten)]
    pub interval: RepeatInterval,
    /// Maximum number of instances to produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl RepeatOptions {
    /// Repeat every `millis` milliseconds.
    pub fn every(millis: u64) -> Self {
        Self {
            interval: RepeatInterval::Every { every: millis },
            limit: None,
        }
    }

    /// Repeat on a cron expression in UTC.
    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            interval: RepeatInterval::Cron {
                cron: expression.into(),
                tz: None,
            },
            limit: None,
        }
    }

    /// Set the time zone. Only meaningful for cron descriptors.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        if let RepeatInterval::Cron { tz, .. } = &mut self.interval {
            *tz = Some(timezone.into());
        }
        self
    }

    /// Set the instance limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options forwarded to the queue store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Job identifier. Required.
    #[serde(
        default,
        alias = "jobId",
        alias = "job_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Delay before the job becomes runnable, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Total number of attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// Priority, 1 being the highest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// Retry backoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffOptions>,
    /// Execution timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Drop the job once it completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_on_complete: Option<bool>,
    /// Drop the job once it fails for good.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_on_fail: Option<bool>,
    /// Replace the stored job whatever its version.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
    /// Recurring schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatOptions>,
}

impl JobOptions {
    /// Options carrying only an id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Desired job configuration, as declared by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Optional label or job type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: JobData,
    /// Queue options. Rejected by validation when absent.
    #[serde(default, alias = "opts", skip_serializing_if = "Option::is_none")]
    pub options: Option<JobOptions>,
    /// Top-level spelling of `options.force`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

impl JobConfig {
    /// Create a configuration with the given id and payload.
    pub fn new(id: impl Into<String>, data: impl Into<JobData>) -> Self {
        Self {
            name: None,
            data: data.into(),
            options: Some(JobOptions::with_id(id)),
            force: false,
        }
    }

    /// Configured id, if any.
    pub fn id(&self) -> Option<&str> {
        self.options.as_ref().and_then(|o| o.id.as_deref())
    }

    /// Whether either force flag is set.
    pub fn is_forced(&self) -> bool {
        self.force || self.options.as_ref().is_some_and(|o| o.force)
    }

    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the `_version` tag of a record payload.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.data.set_version(version);
        self
    }

    /// Set the force flag.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the delay in milliseconds.
    pub fn with_delay(mut self, delay: u64) -> Self {
        self.options_mut().delay = Some(delay);
        self
    }

    /// Set the number of attempts.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.options_mut().attempts = Some(attempts);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.options_mut().priority = Some(priority);
        self
    }

    /// Set the repeat descriptor.
    pub fn with_repeat(mut self, repeat: RepeatOptions) -> Self {
        self.options_mut().repeat = Some(repeat);
        self
    }

    fn options_mut(&mut self) -> &mut JobOptions {
        self.options.get_or_insert_with(JobOptions::default)
    }
}

/// A configuration that passed validation.
///
/// The id and version are extracted and typed; `options.force` already
/// accounts for the top-level flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJob {
    /// Job identifier.
    pub id: JobId,
    /// Parsed `_version` tag.
    pub version: Option<Version>,
    /// Optional label.
    pub name: Option<String>,
    /// Payload, unchanged.
    pub data: JobData,
    /// Options, unchanged apart from `force`.
    pub options: JobOptions,
}

impl ValidatedJob {
    /// Repeat descriptor, if any.
    pub fn repeat(&self) -> Option<&RepeatOptions> {
        self.options.repeat.as_ref()
    }

    /// Whether the version gate is bypassed.
    pub fn is_forced(&self) -> bool {
        self.options.force
    }
}

/// Lifecycle state of a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Runnable, waiting for a worker.
    Waiting,
    /// Scheduled for later.
    Delayed,
    /// Being processed.
    Active,
    /// Finished successfully.
    Completed,
    /// Failed after all attempts.
    Failed,
    /// Held by a paused queue.
    Paused,
}

impl JobState {
    /// State of a freshly added job.
    pub fn initial(options: &JobOptions) -> Self {
        if options.repeat.is_some() || options.delay.is_some_and(|d| d > 0) {
            JobState::Delayed
        } else {
            JobState::Waiting
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Paused => "paused",
        }
    }

    /// Parse a lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobState::Waiting),
            "delayed" => Some(JobState::Delayed),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "paused" => Some(JobState::Paused),
            _ => None,
        }
    }
}

/// Snapshot of a job held by the queue store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingJob {
    /// Configured job id.
    pub id: JobId,
    /// Store key. Equal to `id` except for repeat instances.
    pub key: String,
    /// Label.
    pub name: Option<String>,
    /// Payload.
    pub data: JobData,
    /// Options.
    pub options: JobOptions,
    /// Creation time assigned by the store.
    pub timestamp: DateTime<Utc>,
    /// Lifecycle state.
    pub state: JobState,
}

impl ExistingJob {
    /// Parsed version tag, if any.
    pub fn version(&self) -> Option<Version> {
        self.data.version()
    }
}

/// A standing recurring registration in the queue store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatableDescriptor {
    /// Store registration key.
    pub key: String,
    /// Job id the registration produces instances for.
    pub id: JobId,
    /// Label of the registering job.
    pub name: Option<String>,
    /// Interval or cron expression.
    pub interval: RepeatInterval,
    /// Time of the next instance.
    pub next: DateTime<Utc>,
}

impl RepeatableDescriptor {
    /// Registration key for a job name, id and interval.
    ///
    /// Two intervals under one id yield two distinct keys. Colons inside the
    /// name or id are escaped so distinct pairs never share a key.
    pub fn key_for(name: Option<&str>, id: &JobId, interval: &RepeatInterval) -> String {
        let name = escape_key_part(name.unwrap_or("__default__"));
        let id = escape_key_part(id.as_str());
        match interval {
            RepeatInterval::Every { every } => format!("{}:{}::{}", name, id, every),
            RepeatInterval::Cron { cron, tz } => {
                format!("{}:{}:{}:{}", name, id, tz.as_deref().unwrap_or(""), cron)
            }
        }
    }
}

fn escape_key_part(part: &str) -> String {
    part.replace('\\', "\\\\").replace(':', "\\:")
}
