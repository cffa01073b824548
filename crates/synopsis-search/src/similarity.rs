//! Batch-scoped nearest-neighbor search.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use synopsis_core::{defaults, EmbeddingRepository, Error, Neighbor, Result};

/// Nearest-neighbor queries over stored embeddings.
///
/// Candidates are limited to the query's own batch. The query record and any
/// exact duplicate of its vector (distance zero) are never returned.
#[derive(Clone)]
pub struct SimilaritySearch {
    repo: Arc<dyn EmbeddingRepository>,
    max_limit: i64,
}

impl SimilaritySearch {
    pub fn new(repo: Arc<dyn EmbeddingRepository>) -> Self {
        Self {
            repo,
            max_limit: defaults::NEAREST_LIMIT_MAX,
        }
    }

    /// Override the ceiling applied to `limit`.
    pub fn with_max_limit(mut self, max_limit: i64) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    /// Up to `limit` neighbors of `embedding_id`, nearest first.
    pub async fn nearest(&self, embedding_id: Uuid, limit: i64) -> Result<Vec<Neighbor>> {
        if limit < 0 {
            return Err(Error::Validation(format!(
                "limit must not be negative, got {limit}"
            )));
        }

        let start = Instant::now();
        let query = self
            .repo
            .get(embedding_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("embedding {embedding_id}")))?;

        if limit == 0 {
            return Ok(Vec::new());
        }

        let neighbors = self
            .repo
            .nearest_in_batch(&query, limit.min(self.max_limit))
            .await?;

        debug!(
            subsystem = "search",
            op = "nearest",
            embedding_id = %embedding_id,
            batch_id = %query.batch_id,
            result_count = neighbors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Nearest-neighbor query complete"
        );
        Ok(neighbors)
    }
}
