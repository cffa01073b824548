//! Ollama inference backend implementation.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use synopsis_core::{
    defaults, truncate_chars, EmbeddingBackend, Error, Result, SummarizationBackend,
    SummarizeParams,
};

use crate::config::OllamaConfig;

/// Embedding calls slower than this are logged as slow.
const SLOW_EMBED_MS: u64 = 5_000;

/// Generation calls slower than this are logged as slow.
const SLOW_GENERATE_MS: u64 = 30_000;

/// Ollama inference backend.
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    /// Create a backend from explicit configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.gen_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        info!(
            subsystem = "inference",
            component = "ollama",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing Ollama backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// True if the server answers its model listing.
    pub async fn health_check(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Ollama health check error");
                false
            }
        }
    }

    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        endpoint: &str,
        timeout: std::time::Duration,
        request: &Req,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(format!("{}{}", self.config.base_url, endpoint))
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!("Ollama returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {e}")))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Request payload for the Ollama `/api/generate` endpoint.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize, Debug, PartialEq)]
struct GenerateOptions {
    /// Upper bound on generated tokens.
    num_predict: u32,
    /// Zero for greedy decoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl GenerateOptions {
    fn from_params(params: &SummarizeParams) -> Self {
        Self {
            num_predict: params.max_length,
            temperature: if params.do_sample { None } else { Some(0.0) },
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

fn summary_prompt(text: &str, params: &SummarizeParams) -> String {
    format!(
        "Summarize the following text in at least {} and at most {} words. \
         Reply with the summary only.\n\n{}",
        params.min_length, params.max_length, text
    )
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    #[instrument(skip(self, text), fields(subsystem = "inference", component = "ollama", op = "embed", model = %self.config.embed_model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: vec![text],
        };

        let result: EmbeddingResponse = self
            .post_json("/api/embed", self.config.embed_timeout, &request)
            .await?;
        let vector = result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Inference("Ollama returned no embeddings".into()))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(dimension = vector.len(), duration_ms = elapsed, "Embedding complete");
        if elapsed > SLOW_EMBED_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow embedding operation");
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl SummarizationBackend for OllamaBackend {
    #[instrument(skip(self, text, params), fields(subsystem = "inference", component = "ollama", op = "summarize", model = %self.config.gen_model))]
    async fn summarize(&self, text: &str, params: &SummarizeParams) -> Result<String> {
        let start = Instant::now();
        let input = truncate_chars(text, defaults::SUMMARY_MAX_INPUT_CHARS);
        let request = GenerateRequest {
            model: &self.config.gen_model,
            prompt: summary_prompt(input, params),
            stream: false,
            options: GenerateOptions::from_params(params),
        };

        let result: GenerateResponse = self
            .post_json("/api/generate", self.config.gen_timeout, &request)
            .await?;
        let summary = result.response.trim().to_string();

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            input_chars = input.chars().count(),
            response_len = summary.len(),
            duration_ms = elapsed,
            "Summarization complete"
        );
        if elapsed > SLOW_GENERATE_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow summarization operation");
        }
        Ok(summary)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}
