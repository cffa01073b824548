//! Inference backend configuration.
//!
//! Loaded from environment variables with defaults from
//! `synopsis_core::defaults`:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `OLLAMA_URL` | `http://127.0.0.1:11434` |
//! | `EMBED_MODEL` | `nomic-embed-text` |
//! | `GEN_MODEL` | `llama3.1:8b` |
//! | `EMBED_TIMEOUT_SECS` | `30` |
//! | `GEN_TIMEOUT_SECS` | `120` |

use std::env;
use std::time::Duration;

use synopsis_core::{defaults, Error, Result};

/// Connection and model settings for the Ollama backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub gen_model: String,
    pub embed_timeout: Duration,
    pub gen_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            embed_model: defaults::EMBED_MODEL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            gen_timeout: Duration::from_secs(defaults::GEN_TIMEOUT_SECS),
        }
    }
}

impl OllamaConfig {
    /// Create config from environment variables (with defaults).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str, fallback: Duration| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            base_url: env::var("OLLAMA_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            embed_model: env::var("EMBED_MODEL").unwrap_or(defaults.embed_model),
            gen_model: env::var("GEN_MODEL").unwrap_or(defaults.gen_model),
            embed_timeout: secs("EMBED_TIMEOUT_SECS", defaults.embed_timeout),
            gen_timeout: secs("GEN_TIMEOUT_SECS", defaults.gen_timeout),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_gen_model(mut self, model: impl Into<String>) -> Self {
        self.gen_model = model.into();
        self
    }

    pub fn with_timeouts(mut self, embed: Duration, generation: Duration) -> Self {
        self.embed_timeout = embed;
        self.gen_timeout = generation;
        self
    }

    /// Reject settings that cannot produce a working client.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "OLLAMA_URL must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.embed_model.is_empty() || self.gen_model.is_empty() {
            return Err(Error::Config("model names must not be empty".into()));
        }
        Ok(())
    }
}
