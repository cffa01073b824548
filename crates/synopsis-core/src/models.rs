//! Data model shared by the storage, search, and job crates.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::defaults;
use crate::error::Error;

// =============================================================================
// FINGERPRINTS
// =============================================================================

/// SHA-256 digest of raw input bytes, used as a cache key and as the natural
/// key of an embedding within its batch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash the given text.
    pub fn of(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    /// Hash raw bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl TryFrom<&[u8]> for Fingerprint {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::Storage(format!(
                "fingerprint must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Fingerprint::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// A previously computed artifact, keyed by the fingerprint of its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub artifact: String,
    pub created_at: DateTime<Utc>,
}

/// What goes into the cache fingerprint for a summarization request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyPolicy {
    /// Hash the input text only. Requests that differ only in generation
    /// parameters share one cache line.
    #[default]
    TextOnly,
    /// Hash the input text together with the generation parameters.
    TextAndParams,
}

impl FromStr for CacheKeyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "text_only" => Ok(Self::TextOnly),
            "text_and_params" | "params" => Ok(Self::TextAndParams),
            other => Err(Error::Config(format!("unknown cache key policy: {other}"))),
        }
    }
}

// =============================================================================
// SUMMARIZATION
// =============================================================================

/// Generation parameters for a summarization request.
///
/// Absent fields deserialize to the service defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeParams {
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_min_length")]
    pub min_length: u32,
    #[serde(default)]
    pub do_sample: bool,
    /// Bypass the result cache for this request (no lookup, no store).
    #[serde(default)]
    pub no_cache: bool,
}

fn default_max_length() -> u32 {
    defaults::SUMMARY_MAX_LENGTH
}

fn default_min_length() -> u32 {
    defaults::SUMMARY_MIN_LENGTH
}

impl Default for SummarizeParams {
    fn default() -> Self {
        Self {
            max_length: defaults::SUMMARY_MAX_LENGTH,
            min_length: defaults::SUMMARY_MIN_LENGTH,
            do_sample: false,
            no_cache: false,
        }
    }
}

impl SummarizeParams {
    /// Reject parameter combinations no backend can honour.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_length == 0 {
            return Err(Error::Validation("max_length must be positive".into()));
        }
        if self.min_length > self.max_length {
            return Err(Error::Validation(format!(
                "min_length ({}) exceeds max_length ({})",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }

    /// Build the string whose fingerprint keys the cache for `text`.
    pub fn cache_input<'a>(&self, text: &'a str, policy: CacheKeyPolicy) -> Cow<'a, str> {
        match policy {
            CacheKeyPolicy::TextOnly => Cow::Borrowed(text),
            CacheKeyPolicy::TextAndParams => Cow::Owned(format!(
                "max_length={};min_length={};do_sample={}\n{}",
                self.max_length, self.min_length, self.do_sample, text
            )),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// One stored embedding. Unique per `(batch_id, content_hash)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub batch_id: String,
    pub content_hash: Fingerprint,
    pub vector: Vec<f32>,
    /// Cluster label, set once a clustering job completes for the batch.
    pub cluster: Option<i32>,
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: Uuid,
    pub distance: f64,
}

/// A cluster label to persist for one embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub id: Uuid,
    pub cluster: i32,
}

// =============================================================================
// JOBS
// =============================================================================

/// Lifecycle status of a job. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Storage(format!("unknown job status: {other}"))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Partition a batch of embeddings into k clusters
    Clustering,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Clustering => "clustering",
        }
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clustering" => Ok(JobType::Clustering),
            other => Err(Error::Storage(format!("unknown job type: {other}"))),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job record. Ids are supplied by the caller and must be globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// A freshly submitted job.
    pub fn running(id: impl Into<String>, job_type: JobType) -> Self {
        Self {
            id: id.into(),
            job_type,
            status: JobStatus::Running,
            error_message: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}
