//! Batch-scoped embedding storage.
//!
//! Texts are embedded on the way in and keyed by `(batch_id, SHA-256(text))`,
//! so re-embedding the same content in the same batch refreshes the vector
//! but keeps the id.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use synopsis_core::{
    ClusterAssignment, EmbeddingBackend, EmbeddingRecord, EmbeddingRepository, Error, Fingerprint,
    Result,
};

/// Embedding store: inference on write, repository for everything else.
#[derive(Clone)]
pub struct EmbeddingStore {
    repo: Arc<dyn EmbeddingRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl EmbeddingStore {
    pub fn new(repo: Arc<dyn EmbeddingRepository>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { repo, embedder }
    }

    /// Embed `raw_text` and insert or refresh its row in `batch_id`.
    ///
    /// Nothing is written when validation or inference fails.
    pub async fn upsert(&self, batch_id: &str, raw_text: &str) -> Result<Uuid> {
        if batch_id.trim().is_empty() {
            return Err(Error::Validation("batch_id must not be empty".into()));
        }
        if raw_text.trim().is_empty() {
            return Err(Error::Validation("text must not be empty".into()));
        }

        let content_hash = Fingerprint::of(raw_text);
        let start = Instant::now();

        let vector = self.embedder.embed(raw_text).await.map_err(|e| match e {
            Error::Inference(_) => e,
            other => Error::Inference(other.to_string()),
        })?;
        if vector.is_empty() {
            return Err(Error::Inference(format!(
                "model {} returned an empty embedding",
                self.embedder.model_name()
            )));
        }

        let id = self.repo.upsert(batch_id, &content_hash, &vector).await?;

        debug!(
            subsystem = "embeddings",
            op = "upsert",
            batch_id,
            embedding_id = %id,
            fingerprint = %content_hash.short(),
            dimension = vector.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding stored"
        );
        Ok(id)
    }

    /// All `(id, vector)` pairs of a batch in storage order.
    pub async fn fetch_batch(&self, batch_id: &str) -> Result<Vec<(Uuid, Vec<f32>)>> {
        self.repo.fetch_batch(batch_id).await
    }

    /// Persist cluster labels atomically.
    pub async fn assign_clusters(&self, assignments: &[ClusterAssignment]) -> Result<()> {
        self.repo.assign_clusters(assignments).await?;
        info!(
            subsystem = "embeddings",
            op = "assign_clusters",
            result_count = assignments.len(),
            "Cluster assignments written"
        );
        Ok(())
    }

    /// Get one embedding by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<EmbeddingRecord>> {
        self.repo.get(id).await
    }

    /// Shared repository handle (used by similarity search).
    pub fn repository(&self) -> Arc<dyn EmbeddingRepository> {
        self.repo.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEmbeddingRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as `[len, calls]` so repeated calls are distinguishable.
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(Error::Internal("connection refused".into()));
            }
            Ok(vec![text.len() as f32, n as f32])
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn store(embedder: CountingEmbedder) -> (EmbeddingStore, Arc<InMemoryEmbeddingRepository>) {
        let repo = Arc::new(InMemoryEmbeddingRepository::new());
        (EmbeddingStore::new(repo.clone(), Arc::new(embedder)), repo)
    }

    #[tokio::test]
    async fn test_upsert_stable_id_recomputed_vector() {
        let (store, _) = store(CountingEmbedder::new());

        let id1 = store.upsert("b1", "some text").await.unwrap();
        let id2 = store.upsert("b1", "some text").await.unwrap();
        assert_eq!(id1, id2);

        let record = store.get(id1).await.unwrap().unwrap();
        assert_eq!(record.vector, vec![9.0, 2.0]);
        assert_eq!(record.content_hash, Fingerprint::of("some text"));
        assert_eq!(store.fetch_batch("b1").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_converge() {
        let (store, _) = store(CountingEmbedder::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.upsert("b1", "same").await })
            })
            .collect();

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap());
        }
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.fetch_batch("b1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_validation() {
        let (store, _) = store(CountingEmbedder::new());

        let err = store.upsert("", "text").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = store.upsert("b1", "").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_embed_failure_writes_nothing() {
        let (store, repo) = store(CountingEmbedder::failing());

        let err = store.upsert("b1", "text").await.unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(repo.fetch_batch("b1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_batch_is_empty() {
        let (store, _) = store(CountingEmbedder::new());
        assert!(store.fetch_batch("nothing-here").await.unwrap().is_empty());
        assert!(store.get(Uuid::now_v7()).await.unwrap().is_none());
    }
}
