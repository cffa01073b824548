//! Mock inference backend for deterministic testing.
//!
//! Embeddings are derived from the SHA-256 of the input text, so the same
//! text always embeds to the same vector. Individual texts can be pinned to
//! chosen vectors or summaries.
//!
//! ```rust,ignore
//! let backend = MockInferenceBackend::new()
//!     .with_dimension(2)
//!     .with_embedding("left", vec![0.0, 0.0])
//!     .with_summary("hello", "summary-A");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use synopsis_core::{
    EmbeddingBackend, Error, Fingerprint, Result, SummarizationBackend, SummarizeParams,
};

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    counters: Arc<MockCounters>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    embeddings: HashMap<String, Vec<f32>>,
    summaries: HashMap<String, String>,
    fail_embed: bool,
    fail_summarize: bool,
    latency_ms: u64,
}

#[derive(Default)]
struct MockCounters {
    embed: AtomicUsize,
    summarize: AtomicUsize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 8,
            embeddings: HashMap::new(),
            summaries: HashMap::new(),
            fail_embed: false,
            fail_summarize: false,
            latency_ms: 0,
        }
    }
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Set the dimension of hash-derived embeddings.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension.max(1);
        self
    }

    /// Pin the embedding returned for `text`.
    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.config)
            .embeddings
            .insert(text.into(), vector);
        self
    }

    /// Pin the summary returned for `text`.
    pub fn with_summary(mut self, text: impl Into<String>, summary: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .summaries
            .insert(text.into(), summary.into());
        self
    }

    /// Make every embed call fail.
    pub fn with_embed_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_embed = true;
        self
    }

    /// Make every summarize call fail.
    pub fn with_summarize_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_summarize = true;
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Get number of embed calls.
    pub fn embed_call_count(&self) -> usize {
        self.counters.embed.load(Ordering::SeqCst)
    }

    /// Get number of summarize calls.
    pub fn summarize_call_count(&self) -> usize {
        self.counters.summarize.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    /// Deterministic vector in [-1, 1] derived from the text's SHA-256.
    pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
        let digest = Fingerprint::of(text);
        let bytes = digest.as_bytes();
        (0..dimension)
            .map(|i| {
                let round = (i / bytes.len()) as u8;
                let b = bytes[i % bytes.len()].wrapping_add(round.wrapping_mul(31));
                f32::from(b) / 127.5 - 1.0
            })
            .collect()
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.counters.embed.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.config.fail_embed {
            return Err(Error::Inference("simulated embedding failure".into()));
        }
        if let Some(vector) = self.config.embeddings.get(text) {
            return Ok(vector.clone());
        }
        Ok(Self::hash_embedding(text, self.config.dimension))
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl SummarizationBackend for MockInferenceBackend {
    async fn summarize(&self, text: &str, _params: &SummarizeParams) -> Result<String> {
        self.counters.summarize.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.config.fail_summarize {
            return Err(Error::Inference("simulated summarization failure".into()));
        }
        if let Some(summary) = self.config.summaries.get(text) {
            return Ok(summary.clone());
        }
        Ok(format!("summary of {} chars", text.chars().count()))
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}
