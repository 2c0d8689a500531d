//! SQLite job repository implementation.
//!
//! Implements `JobRepository` from `jobwave-core` using sqlx with split
//! read/write pools. Execution records, jobs, and checkpoints are stored as
//! JSON blobs next to the few columns that queries filter or sort on.

use chrono::{DateTime, SecondsFormat, Utc};
use jobwave_core::repository::JobRepository;
use jobwave_types::checkpoint::SuspendedJob;
use jobwave_types::error::RepositoryError;
use jobwave_types::execution::ExecutionRecord;
use jobwave_types::job::Job;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `JobRepository`.
#[derive(Clone)]
pub struct SqliteJobRepository {
    pool: DatabasePool,
}

impl SqliteJobRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    record: String,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            record: row.try_get("record")?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, RepositoryError> {
        from_json(&self.record, "execution record")
    }
}

struct JobRow {
    job: String,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            job: row.try_get("job")?,
        })
    }

    fn into_job(self) -> Result<Job, RepositoryError> {
        from_json(&self.job, "job")
    }
}

struct SuspendedRow {
    execution_id: String,
    job_id: String,
    checkpoint: String,
    suspended_at: String,
}

impl SuspendedRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            execution_id: row.try_get("execution_id")?,
            job_id: row.try_get("job_id")?,
            checkpoint: row.try_get("checkpoint")?,
            suspended_at: row.try_get("suspended_at")?,
        })
    }

    fn into_suspended(self) -> Result<SuspendedJob, RepositoryError> {
        Ok(SuspendedJob {
            execution_id: parse_uuid(&self.execution_id)?,
            job_id: self.job_id,
            checkpoint: from_json(&self.checkpoint, "checkpoint")?,
            suspended_at: parse_datetime(&self.suspended_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Query(format!("serialize {what}: {e}")))
}

fn from_json<T: DeserializeOwned>(s: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what} JSON: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// JobRepository impl
// ---------------------------------------------------------------------------

impl JobRepository for SqliteJobRepository {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        let record_json = to_json(record, "execution record")?;

        sqlx::query(
            r#"INSERT INTO executions (id, state, record, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 state = excluded.state,
                 record = excluded.record,
                 updated_at = excluded.updated_at"#,
        )
        .bind(record.id.to_string())
        .bind(record.state.to_string())
        .bind(&record_json)
        .bind(format_datetime(&record.created_at))
        .bind(format_datetime(&record.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<ExecutionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT record FROM executions WHERE id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(&self, limit: u32) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT record FROM executions ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ExecutionRow::from_row(row).map_err(query_err)?;
            records.push(r.into_record()?);
        }
        Ok(records)
    }

    async fn save_jobs(&self, execution_id: &Uuid, jobs: &[Job]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        for (ordinal, job) in jobs.iter().enumerate() {
            let job_json = to_json(job, "job")?;
            sqlx::query(
                r#"INSERT INTO jobs (execution_id, job_id, ordinal, status, job)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT(execution_id, job_id) DO UPDATE SET
                     ordinal = excluded.ordinal,
                     status = excluded.status,
                     job = excluded.job"#,
            )
            .bind(execution_id.to_string())
            .bind(&job.id)
            .bind(ordinal as i64)
            .bind(job.status.as_str())
            .bind(&job_json)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn save_job(&self, execution_id: &Uuid, job: &Job) -> Result<(), RepositoryError> {
        let job_json = to_json(job, "job")?;

        // A new job goes after every existing one; an update keeps its place.
        sqlx::query(
            r#"INSERT INTO jobs (execution_id, job_id, ordinal, status, job)
               VALUES (?, ?, (SELECT COALESCE(MAX(ordinal), -1) + 1 FROM jobs WHERE execution_id = ?), ?, ?)
               ON CONFLICT(execution_id, job_id) DO UPDATE SET
                 status = excluded.status,
                 job = excluded.job"#,
        )
        .bind(execution_id.to_string())
        .bind(&job.id)
        .bind(execution_id.to_string())
        .bind(job.status.as_str())
        .bind(&job_json)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn list_jobs(&self, execution_id: &Uuid) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query("SELECT job FROM jobs WHERE execution_id = ? ORDER BY ordinal ASC")
            .bind(execution_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = JobRow::from_row(row).map_err(query_err)?;
            jobs.push(r.into_job()?);
        }
        Ok(jobs)
    }

    async fn save_suspended(&self, suspended: &SuspendedJob) -> Result<(), RepositoryError> {
        let checkpoint_json = to_json(&suspended.checkpoint, "checkpoint")?;

        sqlx::query(
            r#"INSERT INTO suspended_jobs (execution_id, job_id, kind, checkpoint, suspended_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(execution_id, job_id) DO UPDATE SET
                 kind = excluded.kind,
                 checkpoint = excluded.checkpoint,
                 suspended_at = excluded.suspended_at"#,
        )
        .bind(suspended.execution_id.to_string())
        .bind(&suspended.job_id)
        .bind(suspended.checkpoint.kind.as_str())
        .bind(&checkpoint_json)
        .bind(format_datetime(&suspended.suspended_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_suspended(
        &self,
        execution_id: &Uuid,
        job_id: &str,
    ) -> Result<Option<SuspendedJob>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM suspended_jobs WHERE execution_id = ? AND job_id = ?",
        )
        .bind(execution_id.to_string())
        .bind(job_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = SuspendedRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_suspended()?))
            }
            None => Ok(None),
        }
    }

    async fn list_suspended(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<SuspendedJob>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM suspended_jobs WHERE execution_id = ? ORDER BY suspended_at ASC, job_id ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut suspended = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = SuspendedRow::from_row(row).map_err(query_err)?;
            suspended.push(r.into_suspended()?);
        }
        Ok(suspended)
    }

    async fn delete_suspended(
        &self,
        execution_id: &Uuid,
        job_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM suspended_jobs WHERE execution_id = ? AND job_id = ?")
            .bind(execution_id.to_string())
            .bind(job_id)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }
}
