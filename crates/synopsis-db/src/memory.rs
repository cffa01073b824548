//! In-process storage backend.
//!
//! Implements the same repository traits as the Postgres backend on top of
//! `tokio::sync::RwLock`-guarded collections. Used by tests and by local
//! development when no `DATABASE_URL` is configured. Nothing survives a
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use synopsis_core::{
    euclidean_distance, CacheEntry, CacheRepository, ClusterAssignment, EmbeddingRecord,
    EmbeddingRepository, Error, Fingerprint, JobRecord, JobRepository, JobStatus, JobType,
    Neighbor, Result,
};

// =============================================================================
// CACHE
// =============================================================================

/// In-memory summary cache.
#[derive(Default)]
pub struct InMemoryCacheRepository {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl InMemoryCacheRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached artifacts.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheRepository for InMemoryCacheRepository {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(fingerprint)
            .map(|entry| entry.artifact.clone()))
    }

    async fn insert_if_absent(&self, fingerprint: &Fingerprint, artifact: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(fingerprint) {
            return Ok(false);
        }
        entries.insert(
            *fingerprint,
            CacheEntry {
                fingerprint: *fingerprint,
                artifact: artifact.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// In-memory embedding store. Vector order is storage order.
#[derive(Default)]
pub struct InMemoryEmbeddingRepository {
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl InMemoryEmbeddingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingRepository for InMemoryEmbeddingRepository {
    async fn upsert(
        &self,
        batch_id: &str,
        content_hash: &Fingerprint,
        vector: &[f32],
    ) -> Result<Uuid> {
        let mut records = self.records.write().await;
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.batch_id == batch_id && r.content_hash == *content_hash)
        {
            existing.vector = vector.to_vec();
            return Ok(existing.id);
        }

        let id = Uuid::now_v7();
        records.push(EmbeddingRecord {
            id,
            batch_id: batch_id.to_string(),
            content_hash: *content_hash,
            vector: vector.to_vec(),
            cluster: None,
        });
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<EmbeddingRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn fetch_batch(&self, batch_id: &str) -> Result<Vec<(Uuid, Vec<f32>)>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.batch_id == batch_id)
            .map(|r| (r.id, r.vector.clone()))
            .collect())
    }

    async fn assign_clusters(&self, assignments: &[ClusterAssignment]) -> Result<()> {
        let mut records = self.records.write().await;

        let mut positions = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let pos = records
                .iter()
                .position(|r| r.id == assignment.id)
                .ok_or_else(|| Error::NotFound(format!("embedding {} not found", assignment.id)))?;
            positions.push((pos, assignment.cluster));
        }

        for (pos, cluster) in positions {
            records[pos].cluster = Some(cluster);
        }
        Ok(())
    }

    async fn nearest_in_batch(
        &self,
        query: &EmbeddingRecord,
        limit: i64,
    ) -> Result<Vec<Neighbor>> {
        let records = self.records.read().await;
        let mut hits: Vec<Neighbor> = records
            .iter()
            .filter(|r| r.batch_id == query.batch_id && r.id != query.id)
            .filter_map(|r| {
                euclidean_distance(&query.vector, &r.vector).map(|distance| Neighbor {
                    id: r.id,
                    distance,
                })
            })
            .filter(|n| n.distance > 0.0)
            .collect();

        // Stable sort keeps storage order among equal distances.
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(hits)
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// In-memory job records.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job_id: &str, job_type: JobType) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return Err(Error::Storage(format!("job {job_id} already exists")));
        }
        jobs.insert(job_id.to_string(), JobRecord::running(job_id, job_type));
        Ok(())
    }

    async fn finish(&self, job_id: &str, status: JobStatus, error: Option<&str>) -> Result<bool> {
        if !status.is_terminal() {
            return Err(Error::Validation(format!(
                "cannot finish job {job_id} with non-terminal status {status}"
            )));
        }

        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = status;
                job.error_message = error.map(str::to_string);
                job.finished_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn purge_finished(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let start = jobs.len();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished) => job.status == JobStatus::Running || finished >= before,
            None => true,
        });
        Ok((start - jobs.len()) as u64)
    }

    async fn fail_running(&self, error: &str) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let mut failed = 0;
        for job in jobs.values_mut().filter(|job| job.status == JobStatus::Running) {
            job.status = JobStatus::Failed;
            job.error_message = Some(error.to_string());
            job.finished_at = Some(Utc::now());
            failed += 1;
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_first_writer_wins() {
        let repo = InMemoryCacheRepository::new();
        let fp = Fingerprint::of("hello");

        assert!(repo.insert_if_absent(&fp, "summary-A").await.unwrap());
        assert!(!repo.insert_if_absent(&fp, "summary-B").await.unwrap());
        assert_eq!(repo.get(&fp).await.unwrap().as_deref(), Some("summary-A"));
        assert_eq!(repo.len().await, 1);
        assert!(repo.get(&Fingerprint::of("world")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_id_and_replaces_vector() {
        let repo = InMemoryEmbeddingRepository::new();
        let hash = Fingerprint::of("text");

        let id1 = repo.upsert("b1", &hash, &[1.0, 0.0]).await.unwrap();
        let id2 = repo.upsert("b1", &hash, &[2.0, 0.0]).await.unwrap();
        assert_eq!(id1, id2);

        let record = repo.get(id1).await.unwrap().unwrap();
        assert_eq!(record.vector, vec![2.0, 0.0]);
        assert_eq!(record.cluster, None);

        // Same content in another batch is a separate record.
        let other = repo.upsert("b2", &hash, &[1.0, 0.0]).await.unwrap();
        assert_ne!(other, id1);
    }

    #[tokio::test]
    async fn test_fetch_batch_storage_order() {
        let repo = InMemoryEmbeddingRepository::new();
        let a = repo.upsert("b1", &Fingerprint::of("a"), &[1.0]).await.unwrap();
        let _ = repo.upsert("b2", &Fingerprint::of("x"), &[9.0]).await.unwrap();
        let b = repo.upsert("b1", &Fingerprint::of("b"), &[2.0]).await.unwrap();

        let batch = repo.fetch_batch("b1").await.unwrap();
        let ids: Vec<Uuid> = batch.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(repo.fetch_batch("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_clusters_is_all_or_nothing() {
        let repo = InMemoryEmbeddingRepository::new();
        let a = repo.upsert("b1", &Fingerprint::of("a"), &[1.0]).await.unwrap();
        let unknown = Uuid::now_v7();

        let err = repo
            .assign_clusters(&[
                ClusterAssignment { id: a, cluster: 1 },
                ClusterAssignment {
                    id: unknown,
                    cluster: 0,
                },
            ])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains(&unknown.to_string()));
        assert_eq!(repo.get(a).await.unwrap().unwrap().cluster, None);

        repo.assign_clusters(&[ClusterAssignment { id: a, cluster: 1 }])
            .await
            .unwrap();
        assert_eq!(repo.get(a).await.unwrap().unwrap().cluster, Some(1));
    }

    #[tokio::test]
    async fn test_nearest_excludes_self_duplicates_and_other_batches() {
        let repo = InMemoryEmbeddingRepository::new();
        let q = repo.upsert("b1", &Fingerprint::of("q"), &[0.0, 0.0]).await.unwrap();
        let twin = repo.upsert("b1", &Fingerprint::of("twin"), &[0.0, 0.0]).await.unwrap();
        let far = repo.upsert("b1", &Fingerprint::of("far"), &[3.0, 4.0]).await.unwrap();
        let near = repo.upsert("b1", &Fingerprint::of("near"), &[1.0, 0.0]).await.unwrap();
        let _odd = repo.upsert("b1", &Fingerprint::of("odd"), &[1.0, 0.0, 0.0]).await.unwrap();
        let _other = repo.upsert("b2", &Fingerprint::of("o"), &[0.5, 0.0]).await.unwrap();

        let query = repo.get(q).await.unwrap().unwrap();
        let hits = repo.nearest_in_batch(&query, 10).await.unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![near, far]);
        assert!(!ids.contains(&twin));
        assert!((hits[1].distance - 5.0).abs() < 1e-9);

        let hits = repo.nearest_in_batch(&query, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(repo.nearest_in_batch(&query, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_transitions_exactly_once() {
        let repo = InMemoryJobRepository::new();
        repo.create("job-1", JobType::Clustering).await.unwrap();
        assert_eq!(
            repo.get("job-1").await.unwrap().unwrap().status,
            JobStatus::Running
        );

        assert!(repo
            .finish("job-1", JobStatus::Complete, None)
            .await
            .unwrap());
        assert!(!repo
            .finish("job-1", JobStatus::Failed, Some("late"))
            .await
            .unwrap());

        let job = repo.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.error_message.is_none());
        assert!(job.finished_at.is_some());

        assert!(repo.get("nope").await.unwrap().is_none());
        assert!(!repo.finish("nope", JobStatus::Failed, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_job_duplicate_id_rejected() {
        let repo = InMemoryJobRepository::new();
        repo.create("dup", JobType::Clustering).await.unwrap();
        assert!(repo.create("dup", JobType::Clustering).await.is_err());
    }

    #[tokio::test]
    async fn test_job_finish_rejects_running_status() {
        let repo = InMemoryJobRepository::new();
        repo.create("j", JobType::Clustering).await.unwrap();
        let err = repo.finish("j", JobStatus::Running, None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_purge_keeps_running_jobs() {
        let repo = InMemoryJobRepository::new();
        repo.create("done", JobType::Clustering).await.unwrap();
        repo.create("busy", JobType::Clustering).await.unwrap();
        repo.finish("done", JobStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(repo.purge_finished(cutoff).await.unwrap(), 1);
        assert!(repo.get("done").await.unwrap().is_none());
        assert!(repo.get("busy").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fail_running_leaves_terminal_jobs_alone() {
        let repo = InMemoryJobRepository::new();
        repo.create("done", JobType::Clustering).await.unwrap();
        repo.create("stuck", JobType::Clustering).await.unwrap();
        repo.finish("done", JobStatus::Complete, None).await.unwrap();

        assert_eq!(repo.fail_running("interrupted by shutdown").await.unwrap(), 1);

        let stuck = repo.get("stuck").await.unwrap().unwrap();
        assert_eq!(stuck.status, JobStatus::Failed);
        assert_eq!(stuck.error_message.as_deref(), Some("interrupted by shutdown"));
        assert!(stuck.finished_at.is_some());
        assert_eq!(
            repo.get("done").await.unwrap().unwrap().status,
            JobStatus::Complete
        );
        assert_eq!(repo.fail_running("again").await.unwrap(), 0);
    }
}
