//! Relational queue backend using SQLite
//!
//! One row per job. `pop` claims and removes the oldest ready row in a single
//! `DELETE ... RETURNING` statement, so two workers sharing the table can
//! never receive the same job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::backend::{QueueBackend, QueueError};
use crate::clock::{system_clock, SharedClock};
use crate::job::{JobId, JobRecord, Payload};

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Connectivity(e.to_string())
    }
}

/// Durable queue backend using SQLite
#[derive(Debug)]
pub struct DatabaseQueue {
    pool: SqlitePool,
    table: String,
    clock: SharedClock,
}

impl DatabaseQueue {
    /// Open a pool for `url` and prepare the jobs table
    pub async fn connect(url: &str, table: &str, max_connections: u32) -> Result<Self, QueueError> {
        validate_table_name(table)?;

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| QueueError::Configuration(format!("invalid database url: {e}")))?
            .pragma("busy_timeout", "5000");

        // Every connection to `:memory:` opens its own database
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(url, table, max_connections, "Connected to SQLite queue");

        Self::new(pool, table).await
    }

    /// Use an existing pool; creates the table if missing
    pub async fn new(pool: SqlitePool, table: &str) -> Result<Self, QueueError> {
        validate_table_name(table)?;

        let queue = Self {
            pool,
            table: table.to_string(),
            clock: system_clock(),
        };
        queue.ensure_schema().await?;
        Ok(queue)
    }

    /// Replace the time source (tests use a manual clock)
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), QueueError> {
        let table = &self.table;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                queue TEXT NOT NULL,
                job TEXT NOT NULL,
                data TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                available_at INTEGER,
                created_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_queue_available ON {table} (queue, available_at)"
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert(&self, record: &JobRecord) -> Result<(), QueueError> {
        let data = serde_json::to_string(&record.payload)?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, queue, job, data, attempts, available_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.table
        ))
        .bind(record.id.to_string())
        .bind(record.lane.as_str())
        .bind(record.job_type.as_str())
        .bind(data)
        .bind(i64::from(record.attempts))
        .bind(record.available_at.map(|at| at.timestamp_millis()))
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(table: &str) -> Result<(), QueueError> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(QueueError::Configuration(format!(
            "invalid queue table name: {table:?}"
        )))
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, QueueError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| QueueError::Connectivity(format!("timestamp out of range: {ms}")))
}

fn record_from_row(row: &SqliteRow) -> Result<JobRecord, QueueError> {
    let id_str: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|_| QueueError::Connectivity(format!("invalid job id in table: {id_str}")))?;
    let data: String = row.try_get("data")?;
    let attempts: i64 = row.try_get("attempts")?;
    let available_at: Option<i64> = row.try_get("available_at")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(JobRecord {
        id,
        job_type: row.try_get("job")?,
        payload: serde_json::from_str(&data)?,
        lane: row.try_get("queue")?,
        attempts: u32::try_from(attempts).unwrap_or(0),
        available_at: available_at.map(millis_to_datetime).transpose()?,
        created_at: millis_to_datetime(created_at)?,
    })
}

#[async_trait]
impl QueueBackend for DatabaseQueue {
    fn name(&self) -> &str {
        "database"
    }

    async fn push(
        &self,
        job_type: &str,
        payload: Payload,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        let now = self.clock.now();
        let record = JobRecord::new(job_type, payload, lane, now, Some(now));
        self.insert(&record).await?;
        Ok(record.id)
    }

    async fn push_delayed(
        &self,
        job_type: &str,
        payload: Payload,
        delay: Duration,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        let now = self.clock.now();
        let available_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| QueueError::Configuration(format!("delay {delay:?} out of range")))?;

        let record = JobRecord::new(job_type, payload, lane, now, Some(available_at));
        self.insert(&record).await?;
        Ok(record.id)
    }

    async fn pop(&self, lane: &str) -> Result<Option<JobRecord>, QueueError> {
        let table = &self.table;
        let now_ms = self.clock.now().timestamp_millis();

        let row = sqlx::query(&format!(
            r#"
            DELETE FROM {table}
            WHERE seq = (
                SELECT seq FROM {table}
                WHERE queue = ? AND (available_at IS NULL OR available_at <= ?)
                ORDER BY created_at ASC, seq ASC
                LIMIT 1
            )
            RETURNING id, queue, job, data, attempts, available_at, created_at
            "#
        ))
        .bind(lane)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn size(&self, lane: &str) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE queue = ? AND (available_at IS NULL OR available_at <= ?)",
            self.table
        ))
        .bind(lane)
        .bind(self.clock.now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn clear(&self, lane: &str) -> Result<(), QueueError> {
        sqlx::query(&format!("DELETE FROM {} WHERE queue = ?", self.table))
            .bind(lane)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("queue_jobs").is_ok());
        assert!(validate_table_name("_jobs2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2jobs").is_err());
        assert!(validate_table_name("jobs; DROP TABLE users").is_err());
    }

    #[tokio::test]
    async fn test_invalid_table_rejected_before_connecting() {
        let err = DatabaseQueue::connect("sqlite::memory:", "bad-name", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Configuration(_)));
    }
}
