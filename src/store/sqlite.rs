//! SQLite queue store.
//!
//! Persists jobs and repeatable registrations in a SQLite database. Several
//! queues may share one database file; every row is scoped by queue name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::{
    JobCounts, QueueInspector, QueueStore, StoreConnector, StoreError, StoreOptions,
    instance_key, next_run,
};
use crate::core::job::{ExistingJob, JobState, RepeatableDescriptor, ValidatedJob};
use crate::core::types::JobId;

/// key, job_id, name, data, options, timestamp, state
type JobRow = (String, String, Option<String>, String, String, i64, String);

/// key, job_id, name, interval, next
type RepeatableRow = (String, String, Option<String>, String, i64);

const JOB_COLUMNS: &str = "key, job_id, name, data, options, timestamp, state";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// SQLite queue store backend.
pub struct SqliteQueueStore {
    pool: SqlitePool,
    queue: String,
}

impl SqliteQueueStore {
    /// Open (or create) the database at `path` and scope the store to `queue`.
    pub async fn open(path: impl AsRef<Path>, queue: impl Into<String>) -> Result<Self, StoreError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::with_pool(pool, queue).await
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory(queue: impl Into<String>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::with_pool(pool, queue).await
    }

    async fn with_pool(pool: SqlitePool, queue: impl Into<String>) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            queue: queue.into(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Queue this store is scoped to.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn upsert_plain(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        job: &ValidatedJob,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (queue, key, job_id, name, data, options, timestamp, state, registration)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            ON CONFLICT(queue, key) DO UPDATE SET
                name = excluded.name,
                data = excluded.data,
                options = excluded.options,
                state = CASE WHEN jobs.state = 'active' THEN jobs.state ELSE excluded.state END
            "#,
        )
        .bind(&self.queue)
        .bind(job.id.as_str())
        .bind(job.id.as_str())
        .bind(&job.name)
        .bind(serde_json::to_string(&job.data)?)
        .bind(serde_json::to_string(&job.options)?)
        .bind(now.timestamp_millis())
        .bind(JobState::initial(&job.options).as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        job: &ValidatedJob,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let Some(repeat) = job.repeat() else {
            return self.upsert_plain(tx, job, now).await;
        };
        let registration =
            RepeatableDescriptor::key_for(job.name.as_deref(), &job.id, &repeat.interval);

        let registered: Option<(i64,)> =
            sqlx::query_as("SELECT next FROM repeatables WHERE queue = ? AND key = ?")
                .bind(&self.queue)
                .bind(&registration)
                .fetch_optional(&mut **tx)
                .await?;

        let next = match registered {
            Some((next,)) => from_millis(next)?,
            None => {
                let next = next_run(job, &repeat.interval, now)?;
                sqlx::query(
                    "INSERT INTO repeatables (queue, key, job_id, name, interval, next) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&self.queue)
                .bind(&registration)
                .bind(job.id.as_str())
                .bind(&job.name)
                .bind(serde_json::to_string(&repeat.interval)?)
                .bind(next.timestamp_millis())
                .execute(&mut **tx)
                .await?;
                next
            }
        };

        sqlx::query(
            "DELETE FROM jobs WHERE queue = ? AND key = ? AND registration IS NULL AND state != 'active'",
        )
        .bind(&self.queue)
        .bind(job.id.as_str())
        .execute(&mut **tx)
        .await?;

        let pending: Option<(String,)> = sqlx::query_as(
            "SELECT key FROM jobs WHERE queue = ? AND registration = ? AND state IN ('waiting', 'delayed') LIMIT 1",
        )
        .bind(&self.queue)
        .bind(&registration)
        .fetch_optional(&mut **tx)
        .await?;

        match pending {
            Some((key,)) => {
                sqlx::query(
                    "UPDATE jobs SET name = ?, data = ?, options = ?, state = ? WHERE queue = ? AND key = ?",
                )
                .bind(&job.name)
                .bind(serde_json::to_string(&job.data)?)
                .bind(serde_json::to_string(&job.options)?)
                .bind(JobState::Delayed.as_str())
                .bind(&self.queue)
                .bind(key)
                .execute(&mut **tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO jobs (queue, key, job_id, name, data, options, timestamp, state, registration)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&self.queue)
                .bind(instance_key(&registration, next))
                .bind(job.id.as_str())
                .bind(&job.name)
                .bind(serde_json::to_string(&job.data)?)
                .bind(serde_json::to_string(&job.options)?)
                .bind(now.timestamp_millis())
                .bind(JobState::Delayed.as_str())
                .bind(&registration)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Serialization(format!("timestamp out of range: {}", millis)))
}

fn job_from_row(row: JobRow) -> Result<ExistingJob, StoreError> {
    let (key, job_id, name, data, options, timestamp, state) = row;
    Ok(ExistingJob {
        id: JobId::new(job_id),
        key,
        name,
        data: serde_json::from_str(&data)?,
        options: serde_json::from_str(&options)?,
        timestamp: from_millis(timestamp)?,
        state: JobState::parse(&state)
            .ok_or_else(|| StoreError::Serialization(format!("unknown job state: {}", state)))?,
    })
}

fn repeatable_from_row(row: RepeatableRow) -> Result<RepeatableDescriptor, StoreError> {
    let (key, job_id, name, interval, next) = row;
    Ok(RepeatableDescriptor {
        key,
        id: JobId::new(job_id),
        name,
        interval: serde_json::from_str(&interval)?,
        next: from_millis(next)?,
    })
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn list_jobs(&self) -> Result<Vec<ExistingJob>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE queue = ? ORDER BY timestamp, key",
            JOB_COLUMNS
        ))
        .bind(&self.queue)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn list_repeatables(&self) -> Result<Vec<RepeatableDescriptor>, StoreError> {
        let rows: Vec<RepeatableRow> = sqlx::query_as(
            "SELECT key, job_id, name, interval, next FROM repeatables WHERE queue = ? ORDER BY key",
        )
        .bind(&self.queue)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(repeatable_from_row).collect()
    }

    async fn add_jobs_bulk(&self, jobs: &[ValidatedJob]) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for job in jobs {
            self.upsert(&mut tx, job, now).await?;
        }
        tx.commit().await?;
        tracing::debug!(queue = %self.queue, count = jobs.len(), "Committed job batch");
        Ok(())
    }

    async fn remove_jobs_bulk(&self, ids: &[JobId]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM jobs WHERE queue = ? AND job_id = ?")
                .bind(&self.queue)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_repeatable(
        &self,
        id: &JobId,
        descriptor: &RepeatableDescriptor,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM repeatables WHERE queue = ? AND key = ?")
            .bind(&self.queue)
            .bind(&descriptor.key)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM jobs WHERE queue = ? AND registration = ? AND job_id = ? AND state IN ('waiting', 'delayed')",
        )
        .bind(&self.queue)
        .bind(&descriptor.key)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl QueueInspector for SqliteQueueStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<ExistingJob>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE queue = ? AND job_id = ? ORDER BY timestamp DESC LIMIT 1",
            JOB_COLUMNS
        ))
        .bind(&self.queue)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(job_from_row).transpose()
    }

    async fn job_counts(&self) -> Result<JobCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs WHERE queue = ? GROUP BY state")
                .bind(&self.queue)
                .fetch_all(&self.pool)
                .await?;

        let mut counts = JobCounts::default();
        for (state, count) in rows {
            let state = JobState::parse(&state)
                .ok_or_else(|| StoreError::Serialization(format!("unknown job state: {}", state)))?;
            counts.add(state, usize::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }
}

/// Connector opening a [`SqliteQueueStore`] from the `path` option.
///
/// `path = ":memory:"` opens a private in-memory database per connection.
pub struct SqliteConnector;

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn connect(
        &self,
        queue: &str,
        options: &StoreOptions,
    ) -> Result<Arc<dyn QueueStore>, StoreError> {
        let path = options
            .get_str("path")
            .ok_or_else(|| StoreError::InvalidOptions("sqlite backend requires 'path'".into()))?;

        let store = if path == ":memory:" {
            SqliteQueueStore::in_memory(queue).await?
        } else {
            SqliteQueueStore::open(path, queue).await?
        };
        tracing::debug!(queue, path, "Opened SQLite queue store");
        Ok(Arc::new(store))
    }
}
