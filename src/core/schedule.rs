//! Repeat schedule parsing and next occurrence calculation.
//!
//! A repeat descriptor is either a fixed interval in milliseconds or a cron
//! expression evaluated in a time zone. Supports standard 5-field cron,
//! extended 6-field cron (with seconds) and shortcuts (@daily, @hourly, etc.).

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use thiserror::Error;

use super::job::RepeatInterval;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// A parsed repeat schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    kind: ScheduleKind,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
    Cron { schedule: Box<CronSchedule>, tz: Tz },
    Every(Duration),
}

impl Schedule {
    /// Parse the schedule described by a repeat interval.
    pub fn from_interval(interval: &RepeatInterval) -> Result<Self, ScheduleError> {
        match interval {
            RepeatInterval::Every { every } => Self::every(*every),
            RepeatInterval::Cron { cron, tz } => {
                Self::cron(cron, tz.as_deref().unwrap_or("UTC"))
            }
        }
    }

    /// Create a fixed-interval schedule.
    pub fn every(millis: u64) -> Result<Self, ScheduleError> {
        if millis == 0 {
            return Err(ScheduleError::InvalidInterval(
                "interval must be greater than zero".into(),
            ));
        }
        let millis = i64::try_from(millis)
            .map_err(|_| ScheduleError::InvalidInterval(format!("{} ms is too large", millis)))?;
        let duration = Duration::try_milliseconds(millis)
            .ok_or_else(|| ScheduleError::InvalidInterval(format!("{} ms is too large", millis)))?;
        Ok(Self {
            kind: ScheduleKind::Every(duration),
        })
    }

    /// Create a cron schedule evaluated in the given time zone.
    pub fn cron(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))?;

        let trimmed = expression.trim();
        let schedule = if trimmed.starts_with('@') {
            Self::parse_shortcut(trimmed)?
        } else {
            Self::parse_cron(trimmed)?
        };

        Ok(Self {
            kind: ScheduleKind::Cron {
                schedule: Box::new(schedule),
                tz,
            },
        })
    }

    fn parse_shortcut(expression: &str) -> Result<CronSchedule, ScheduleError> {
        match expression.to_lowercase().as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 * * *"),
            "@hourly" => Self::parse_cron("0 * * * *"),
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            ))),
        }
    }

    fn parse_cron(expression: &str) -> Result<CronSchedule, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();

        let cron_expr = match fields.len() {
            5 => format!("0 {}", expression),
            6 => expression.to_string(),
            _ => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    fields.len()
                )));
            }
        };

        CronSchedule::from_str(&cron_expr).map_err(|e| ScheduleError::InvalidCron(e.to_string()))
    }

    /// Get the next occurrence after the given time.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match &self.kind {
            ScheduleKind::Cron { schedule, tz } => schedule
                .after(&after.with_timezone(tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or(ScheduleError::NoMoreOccurrences),
            ScheduleKind::Every(duration) => after
                .checked_add_signed(*duration)
                .ok_or(ScheduleError::NoMoreOccurrences),
        }
    }
}
