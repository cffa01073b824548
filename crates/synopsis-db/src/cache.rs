//! Summary cache repository implementation.

use async_trait::async_trait;
use sqlx::Row;

use synopsis_core::{CacheRepository, Fingerprint, Result};

use crate::pool::ConnectionPool;

/// PostgreSQL implementation of CacheRepository.
pub struct PgCacheRepository {
    pool: ConnectionPool,
}

impl PgCacheRepository {
    /// Create a new PgCacheRepository with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheRepository for PgCacheRepository {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query("SELECT artifact FROM summary_cache WHERE hash = $1")
            .bind(&fingerprint.as_bytes()[..])
            .fetch_optional(&mut *conn)
            .await;
        let row = self.pool.settle(conn, result)?;

        Ok(row.map(|r| r.get("artifact")))
    }

    async fn insert_if_absent(&self, fingerprint: &Fingerprint, artifact: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "INSERT INTO summary_cache (hash, artifact, created_at)
             VALUES ($1, $2, now())
             ON CONFLICT (hash) DO NOTHING",
        )
        .bind(&fingerprint.as_bytes()[..])
        .bind(artifact)
        .execute(&mut *conn)
        .await;
        let done = self.pool.settle(conn, result)?;

        Ok(done.rows_affected() == 1)
    }
}
