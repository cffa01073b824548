//! Trait seams between the core components and their collaborators.
//!
//! Storage is reached only through the repository traits, so every component
//! works against either the Postgres backend or the in-memory one. Inference
//! is reached only through the backend traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ClusterAssignment, EmbeddingRecord, Fingerprint, JobRecord, JobStatus, JobType, Neighbor,
    SummarizeParams,
};

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Write-once store of computed artifacts keyed by input fingerprint.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Look up the artifact stored for `fingerprint`.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>>;

    /// Store `artifact` unless an entry already exists.
    ///
    /// Returns `true` if this call inserted the entry. An existing entry is
    /// left untouched, whatever its value.
    async fn insert_if_absent(&self, fingerprint: &Fingerprint, artifact: &str) -> Result<bool>;
}

/// Batch-scoped embedding storage.
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Insert or update the row for `(batch_id, content_hash)`, returning its
    /// stable id.
    async fn upsert(
        &self,
        batch_id: &str,
        content_hash: &Fingerprint,
        vector: &[f32],
    ) -> Result<Uuid>;

    /// Get one embedding by id.
    async fn get(&self, id: Uuid) -> Result<Option<EmbeddingRecord>>;

    /// All `(id, vector)` pairs of a batch in storage order. Unknown batches
    /// yield an empty list.
    async fn fetch_batch(&self, batch_id: &str) -> Result<Vec<(Uuid, Vec<f32>)>>;

    /// Persist cluster labels. All-or-nothing: an unknown id aborts the whole
    /// update with an error naming it.
    async fn assign_clusters(&self, assignments: &[ClusterAssignment]) -> Result<()>;

    /// Neighbors of `query` within its own batch, nearest first, excluding
    /// `query` itself and any zero-distance match.
    async fn nearest_in_batch(&self, query: &EmbeddingRecord, limit: i64)
        -> Result<Vec<Neighbor>>;
}

/// Job lifecycle records.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Record a new job in `running` state.
    async fn create(&self, job_id: &str, job_type: JobType) -> Result<()>;

    /// Move a running job to a terminal status.
    ///
    /// Returns `false` (and changes nothing) if the job is unknown or already
    /// terminal.
    async fn finish(&self, job_id: &str, status: JobStatus, error: Option<&str>) -> Result<bool>;

    /// Get a job by id.
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>>;

    /// Delete terminal jobs that finished before `before`. Returns the number
    /// of records removed.
    async fn purge_finished(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Fail every job still `running` with `error`. Returns the number of
    /// jobs changed.
    async fn fail_running(&self, error: &str) -> Result<u64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for embedding generation.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for summarization.
#[async_trait]
pub trait SummarizationBackend: Send + Sync {
    /// Summarize `text` honouring the given length bounds and sampling flag.
    async fn summarize(&self, text: &str, params: &SummarizeParams) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
