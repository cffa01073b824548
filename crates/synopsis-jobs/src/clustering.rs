//! Batch clustering: partition a batch's embeddings and persist the labels.

use std::time::Instant;

use tracing::{info, instrument, trace};

use synopsis_core::{ClusterAssignment, Error, JobType, Result};
use synopsis_db::EmbeddingStore;
use synopsis_search::{kmeans, KMeansConfig};

use crate::scheduler::JobScheduler;

/// What a clustering run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringReport {
    pub batch_id: String,
    pub k: usize,
    pub vector_count: usize,
    pub inertia: f64,
    pub n_iter: usize,
}

/// Runs seeded k-means over one batch and writes the labels back.
#[derive(Clone)]
pub struct ClusteringEngine {
    store: EmbeddingStore,
    config: KMeansConfig,
}

impl ClusteringEngine {
    pub fn new(store: EmbeddingStore) -> Self {
        Self::with_config(store, KMeansConfig::default())
    }

    pub fn with_config(store: EmbeddingStore, config: KMeansConfig) -> Self {
        Self { store, config }
    }

    /// Cluster `batch_id` into `k` groups.
    ///
    /// Every check happens before anything is written, and the labels are
    /// written in one atomic step, so a failed run leaves the batch as it
    /// was.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "clustering", op = "run"))]
    pub async fn run(&self, batch_id: &str, k: i64) -> Result<ClusteringReport> {
        if k <= 0 {
            return Err(Error::Validation(format!("k must be positive, got {k}")));
        }
        let k = usize::try_from(k)
            .map_err(|_| Error::Validation(format!("k out of range: {k}")))?;

        let start = Instant::now();
        let batch = self.store.fetch_batch(batch_id).await?;
        if batch.is_empty() {
            return Err(Error::NotFound(format!("batch {batch_id} is empty")));
        }

        let (ids, vectors): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || kmeans(&vectors, k, &config))
            .await
            .map_err(|e| Error::Internal(format!("k-means task failed: {e}")))??;

        let assignments = ids
            .iter()
            .zip(&result.labels)
            .map(|(&id, &label)| -> Result<ClusterAssignment> {
                let cluster = i32::try_from(label)
                    .map_err(|_| Error::Internal(format!("cluster label {label} overflows")))?;
                trace!(embedding_id = %id, cluster, "Assigned");
                Ok(ClusterAssignment { id, cluster })
            })
            .collect::<Result<Vec<_>>>()?;

        self.store.assign_clusters(&assignments).await?;

        info!(
            batch_id,
            k,
            vector_count = assignments.len(),
            inertia = result.inertia,
            n_iter = result.n_iter,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch clustered"
        );

        Ok(ClusteringReport {
            batch_id: batch_id.to_string(),
            k,
            vector_count: assignments.len(),
            inertia: result.inertia,
            n_iter: result.n_iter,
        })
    }

    /// Submit a clustering run of `batch_id` as job `job_id`.
    ///
    /// Only fails if the job record cannot be created; a bad `k` or an empty
    /// batch shows up later as a failed job.
    pub async fn submit_clustering(
        &self,
        scheduler: &JobScheduler,
        batch_id: &str,
        k: i64,
        job_id: &str,
    ) -> Result<()> {
        let engine = self.clone();
        let batch_id = batch_id.to_string();
        scheduler
            .submit(job_id, JobType::Clustering, move || async move {
                engine.run(&batch_id, k).await.map(|_| ())
            })
            .await
    }
}
