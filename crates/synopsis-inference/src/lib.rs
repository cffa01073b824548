//! # synopsis-inference
//!
//! Inference collaborators for synopsis: summarization and embedding.
//!
//! Backends implement [`SummarizationBackend`] and [`EmbeddingBackend`] from
//! `synopsis-core`, so the service never depends on a concrete model server.
//!
//! ## Backends
//!
//! - `ollama` (default): HTTP client for a local or remote Ollama server
//! - `mock`: deterministic in-process backend for tests

pub mod config;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "mock")]
pub mod mock;

pub use synopsis_core::{EmbeddingBackend, SummarizationBackend};

pub use config::OllamaConfig;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(feature = "mock")]
pub use mock::MockInferenceBackend;
