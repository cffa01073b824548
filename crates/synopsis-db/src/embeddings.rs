//! Embedding repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use synopsis_core::{
    ClusterAssignment, EmbeddingRecord, EmbeddingRepository, Error, Fingerprint, Neighbor, Result,
};

use crate::pool::ConnectionPool;

/// PostgreSQL + pgvector implementation of EmbeddingRepository.
pub struct PgEmbeddingRepository {
    pool: ConnectionPool,
}

impl PgEmbeddingRepository {
    /// Create a new PgEmbeddingRepository with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: PgRow) -> Result<EmbeddingRecord> {
        let hash: Vec<u8> = row.get("content_hash");
        let vector: Vector = row.get("vector");
        Ok(EmbeddingRecord {
            id: row.get("id"),
            batch_id: row.get("batch_id"),
            content_hash: Fingerprint::try_from(hash.as_slice())?,
            vector: vector.to_vec(),
            cluster: row.get("cluster"),
        })
    }
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn upsert(
        &self,
        batch_id: &str,
        content_hash: &Fingerprint,
        vector: &[f32],
    ) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        // On conflict the existing row keeps its id; only the vector moves.
        let result = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO embedding (id, batch_id, content_hash, vector, created_at, updated_at)
             VALUES ($1, $2, $3, $4, now(), now())
             ON CONFLICT (batch_id, content_hash)
             DO UPDATE SET vector = EXCLUDED.vector, updated_at = now()
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(batch_id)
        .bind(&content_hash.as_bytes()[..])
        .bind(Vector::from(vector.to_vec()))
        .fetch_one(&mut *conn)
        .await;

        self.pool.settle(conn, result)
    }

    async fn get(&self, id: Uuid) -> Result<Option<EmbeddingRecord>> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "SELECT id, batch_id, content_hash, vector, cluster
             FROM embedding
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;

        self.pool
            .settle(conn, result)?
            .map(Self::parse_row)
            .transpose()
    }

    async fn fetch_batch(&self, batch_id: &str) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "SELECT id, vector
             FROM embedding
             WHERE batch_id = $1
             ORDER BY seq",
        )
        .bind(batch_id)
        .fetch_all(&mut *conn)
        .await;
        let rows = self.pool.settle(conn, result)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let vector: Vector = row.get("vector");
                (row.get("id"), vector.to_vec())
            })
            .collect())
    }

    async fn assign_clusters(&self, assignments: &[ClusterAssignment]) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for assignment in assignments {
            let done = sqlx::query(
                "UPDATE embedding SET cluster = $2, updated_at = now() WHERE id = $1",
            )
            .bind(assignment.id)
            .bind(assignment.cluster)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            if done.rows_affected() == 0 {
                // Dropping `tx` rolls back every label written so far.
                return Err(Error::NotFound(format!(
                    "embedding {} not found",
                    assignment.id
                )));
            }
        }
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "embeddings",
            op = "assign_clusters",
            result_count = assignments.len(),
            "Cluster labels persisted"
        );
        Ok(())
    }

    async fn nearest_in_batch(
        &self,
        query: &EmbeddingRecord,
        limit: i64,
    ) -> Result<Vec<Neighbor>> {
        let mut conn = self.pool.acquire().await?;
        // CASE keeps `<->` away from rows of another dimension, which pgvector
        // would reject outright.
        let result = sqlx::query(
            "SELECT id, distance FROM (
                 SELECT e.id, e.seq,
                        CASE WHEN vector_dims(e.vector) = $4
                             THEN e.vector <-> $3::vector
                        END AS distance
                 FROM embedding e
                 WHERE e.batch_id = $1 AND e.id <> $2
             ) candidates
             WHERE distance > 0
             ORDER BY distance, seq
             LIMIT $5",
        )
        .bind(&query.batch_id)
        .bind(query.id)
        .bind(Vector::from(query.vector.clone()))
        .bind(query.vector.len() as i32)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await;
        let rows = self.pool.settle(conn, result)?;

        Ok(rows
            .into_iter()
            .map(|row| Neighbor {
                id: row.get("id"),
                distance: row.get("distance"),
            })
            .collect())
    }
}
