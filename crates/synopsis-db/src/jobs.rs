//! Job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use synopsis_core::{Error, JobRecord, JobRepository, JobStatus, JobType, Result};

use crate::pool::ConnectionPool;

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: ConnectionPool,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Parse a job row into a JobRecord.
    fn parse_job_row(row: PgRow) -> Result<JobRecord> {
        let job_type: String = row.get("job_type");
        let status: String = row.get("status");
        Ok(JobRecord {
            id: row.get("id"),
            job_type: job_type.parse::<JobType>()?,
            status: status.parse::<JobStatus>()?,
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            finished_at: row.get("finished_at"),
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, job_id: &str, job_type: JobType) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        // A reused id hits the primary key and surfaces as a storage error.
        let result = sqlx::query(
            "INSERT INTO job (id, job_type, status, created_at)
             VALUES ($1, $2, 'running', now())",
        )
        .bind(job_id)
        .bind(job_type.as_str())
        .execute(&mut *conn)
        .await;
        self.pool.settle(conn, result)?;
        Ok(())
    }

    async fn finish(&self, job_id: &str, status: JobStatus, error: Option<&str>) -> Result<bool> {
        if !status.is_terminal() {
            return Err(Error::Validation(format!(
                "cannot finish job {job_id} with non-terminal status {status}"
            )));
        }

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "UPDATE job
             SET status = $2, error_message = $3, finished_at = now()
             WHERE id = $1 AND status = 'running'",
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(error)
        .execute(&mut *conn)
        .await;
        let done = self.pool.settle(conn, result)?;

        Ok(done.rows_affected() == 1)
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "SELECT id, job_type, status, error_message, created_at, finished_at
             FROM job
             WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await;

        self.pool
            .settle(conn, result)?
            .map(Self::parse_job_row)
            .transpose()
    }

    async fn purge_finished(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "DELETE FROM job
             WHERE status <> 'running' AND finished_at < $1",
        )
        .bind(before)
        .execute(&mut *conn)
        .await;
        let done = self.pool.settle(conn, result)?;

        Ok(done.rows_affected())
    }

    async fn fail_running(&self, error: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "UPDATE job
             SET status = 'failed', error_message = $1, finished_at = now()
             WHERE status = 'running'",
        )
        .bind(error)
        .execute(&mut *conn)
        .await;
        let done = self.pool.settle(conn, result)?;

        Ok(done.rows_affected())
    }
}
