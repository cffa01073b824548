//! Centralized default constants for synopsis.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers; environment variables override them at startup.

// =============================================================================
// SUMMARIZATION
// =============================================================================

/// Default upper bound on summary length.
pub const SUMMARY_MAX_LENGTH: u32 = 3000;

/// Default lower bound on summary length.
pub const SUMMARY_MIN_LENGTH: u32 = 10;

/// Input text beyond this many characters is dropped before inference.
pub const SUMMARY_MAX_INPUT_CHARS: usize = 3000;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default summarization model name (Ollama).
pub const GEN_MODEL: &str = "llama3.1:8b";

/// Timeout for a single embedding request.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for a single summarization request.
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum number of pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default minimum number of pooled connections kept warm.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// How long `acquire` waits for a free connection before giving up.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connections are closed after this long.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Connections are recycled after this long.
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// SEARCH
// =============================================================================

/// Default neighbor count for nearest-neighbor queries.
pub const NEAREST_LIMIT: i64 = 10;

/// Hard ceiling on neighbor count.
pub const NEAREST_LIMIT_MAX: i64 = 1000;

// =============================================================================
// CLUSTERING
// =============================================================================

/// Fixed RNG seed so that reruns over the same batch produce the same labels.
pub const KMEANS_SEED: u64 = 42;

/// Number of seeded k-means restarts; the lowest-inertia run wins.
pub const KMEANS_N_INIT: usize = 10;

/// Maximum Lloyd iterations per restart.
pub const KMEANS_MAX_ITER: usize = 300;

/// Convergence tolerance on total squared center shift.
pub const KMEANS_TOLERANCE: f64 = 1e-4;

// =============================================================================
// JOBS
// =============================================================================

/// Maximum concurrently executing jobs.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Capacity of the job event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Interval between retention sweeps when a retention window is configured.
pub const JOB_PURGE_INTERVAL_SECS: u64 = 3600;

/// Attempts at recording a job's terminal status before giving up.
pub const JOB_FINISH_ATTEMPTS: u32 = 5;

/// Delay before the first retry of a terminal status write; doubles per retry.
pub const JOB_FINISH_BACKOFF_MS: u64 = 50;

/// Error recorded on jobs whose process stopped before they finished.
pub const JOB_INTERRUPTED_MESSAGE: &str = "interrupted by shutdown";

// =============================================================================
// SERVER
// =============================================================================

/// Default bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const SERVER_PORT: u16 = 5000;
