//! The service facade: every core operation the HTTP surface and the CLI
//! reach, wired to one storage backend and one pair of inference backends.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use synopsis_core::{
    CacheKeyPolicy, EmbeddingBackend, Error, Fingerprint, JobRecord, JobStatus, Neighbor,
    Result, SummarizationBackend, SummarizeParams,
};
use synopsis_db::{CacheStats, EmbeddingStore, ResultCache, Storage};
use synopsis_jobs::{ClusteringEngine, JobScheduler, SchedulerConfig};
use synopsis_search::SimilaritySearch;

/// Knobs that shape the service beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub cache_enabled: bool,
    pub cache_key_policy: CacheKeyPolicy,
    pub scheduler: SchedulerConfig,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_key_policy: CacheKeyPolicy::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Summarization, embedding, search and clustering over one backend.
#[derive(Clone)]
pub struct SynopsisService {
    cache: ResultCache,
    store: EmbeddingStore,
    search: SimilaritySearch,
    scheduler: JobScheduler,
    clustering: ClusteringEngine,
    summarizer: Arc<dyn SummarizationBackend>,
    key_policy: CacheKeyPolicy,
    backend: &'static str,
}

impl SynopsisService {
    pub fn new(
        storage: Storage,
        embedder: Arc<dyn EmbeddingBackend>,
        summarizer: Arc<dyn SummarizationBackend>,
        options: ServiceOptions,
    ) -> Self {
        let cache = if options.cache_enabled {
            ResultCache::new(storage.cache.clone())
        } else {
            ResultCache::disabled()
        };
        let store = EmbeddingStore::new(storage.embeddings.clone(), embedder);
        let search = SimilaritySearch::new(storage.embeddings.clone());
        let scheduler = JobScheduler::new(storage.jobs.clone(), options.scheduler);
        let clustering = ClusteringEngine::new(store.clone());

        info!(
            subsystem = "api",
            component = "service",
            backend = storage.backend,
            cache_enabled = options.cache_enabled,
            cache_key_policy = ?options.cache_key_policy,
            summarizer = summarizer.model_name(),
            "Service initialized"
        );

        Self {
            cache,
            store,
            search,
            scheduler,
            clustering,
            summarizer,
            key_policy: options.cache_key_policy,
            backend: storage.backend,
        }
    }

    /// Cached artifact for `text`, if any.
    pub async fn cache_get(&self, text: &str) -> Option<String> {
        self.cache.get(text).await
    }

    /// Store `artifact` for `text` unless `skip` is set or an entry exists.
    pub async fn cache_put(&self, text: &str, artifact: &str, skip: bool) {
        self.cache.put(text, artifact, skip).await
    }

    /// Embed `text` into `batch_id`, returning the embedding's stable id.
    pub async fn embed_upsert(&self, batch_id: &str, text: &str) -> Result<Uuid> {
        self.store.upsert(batch_id, text).await
    }

    /// Nearest neighbors of an embedding within its batch.
    pub async fn nearest_neighbors(&self, id: Uuid, limit: i64) -> Result<Vec<Neighbor>> {
        self.search.nearest(id, limit).await
    }

    /// Start clustering `batch_id` into `k` groups as job `job_id`.
    ///
    /// Returns once the job is recorded. Bad input surfaces as a failed job.
    pub async fn submit_clustering(&self, batch_id: &str, k: i64, job_id: &str) -> Result<()> {
        self.clustering
            .submit_clustering(&self.scheduler, batch_id, k, job_id)
            .await
    }

    /// Status of a job; `None` for unknown ids.
    pub async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        self.scheduler.status(job_id).await
    }

    /// Full job record; `None` for unknown ids.
    pub async fn job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.scheduler.get(job_id).await
    }

    /// Summarize `text`, consulting the result cache first.
    ///
    /// With `no_cache` set the cache is neither read nor written.
    #[instrument(skip(self, text, params), fields(subsystem = "api", component = "service", op = "summarize"))]
    pub async fn summarize(&self, text: &str, params: &SummarizeParams) -> Result<String> {
        params.validate()?;
        if text.trim().is_empty() {
            return Err(Error::Validation("text must not be empty".into()));
        }

        let key = params.cache_input(text, self.key_policy);
        if !params.no_cache {
            if let Some(hit) = self.cache.get(&key).await {
                debug!(fingerprint = %Fingerprint::of(&key).short(), "Summary served from cache");
                return Ok(hit);
            }
        }

        let start = Instant::now();
        let summary = self
            .summarizer
            .summarize(text, params)
            .await
            .map_err(|e| match e {
                Error::Inference(_) => e,
                other => Error::Inference(other.to_string()),
            })?;
        debug!(
            input_chars = text.chars().count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Summary generated"
        );

        self.cache.put(&key, &summary, params.no_cache).await;
        Ok(summary)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    /// Storage backend label ("postgres" or "memory").
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }
}
