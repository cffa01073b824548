//! Server configuration.
//!
//! Environment variables:
//! - `HOST`, `PORT`: bind address (default `0.0.0.0:5000`)
//! - `STORAGE_BACKEND`: `postgres` or `memory` (default: `postgres` when
//!   `DATABASE_URL` is set, `memory` otherwise)
//! - `DATABASE_URL`: PostgreSQL connection string
//! - `CACHE_ENABLED`: set to "false" to disable the result cache
//! - `CACHE_KEY_POLICY`: `text` (default) or `text_and_params`
//! - `JOB_RETENTION_HOURS`: purge finished jobs older than this; unset keeps
//!   them forever

use std::time::Duration;

use synopsis_core::{defaults, CacheKeyPolicy, Error, Result};
use synopsis_jobs::SchedulerConfig;

use crate::services::ServiceOptions;

/// Which storage backend the server runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { url: String },
    Memory,
}

/// Top-level settings for the server and the clustering CLI.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub cache_enabled: bool,
    pub cache_key_policy: CacheKeyPolicy,
    pub job_retention: Option<Duration>,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.scheduler = SchedulerConfig::from_env();
        Ok(config)
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("HOST").unwrap_or_else(|| defaults::SERVER_HOST.to_string());
        let port = match lookup("PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got {v}")))?,
            None => defaults::SERVER_PORT,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let storage = match lookup("STORAGE_BACKEND").as_deref().map(str::to_lowercase) {
            Some(ref b) if b == "memory" => StorageBackend::Memory,
            Some(ref b) if b == "postgres" => match database_url {
                Some(url) => StorageBackend::Postgres { url },
                None => {
                    return Err(Error::Config(
                        "STORAGE_BACKEND=postgres requires DATABASE_URL".into(),
                    ))
                }
            },
            Some(other) => {
                return Err(Error::Config(format!(
                    "STORAGE_BACKEND must be postgres or memory, got {other}"
                )))
            }
            None => match database_url {
                Some(url) => StorageBackend::Postgres { url },
                None => StorageBackend::Memory,
            },
        };

        let cache_enabled = lookup("CACHE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let cache_key_policy = match lookup("CACHE_KEY_POLICY") {
            Some(v) => v.parse()?,
            None => CacheKeyPolicy::default(),
        };

        let job_retention = match lookup("JOB_RETENTION_HOURS") {
            Some(v) => {
                let hours = v.parse::<u64>().map_err(|_| {
                    Error::Config(format!("JOB_RETENTION_HOURS must be a whole number, got {v}"))
                })?;
                Some(Duration::from_secs(hours * 3600))
            }
            None => None,
        };

        Ok(Self {
            host,
            port,
            storage,
            cache_enabled,
            cache_key_policy,
            job_retention,
            scheduler: SchedulerConfig::default(),
        })
    }

    /// Options for building the service from this config.
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            cache_enabled: self.cache_enabled,
            cache_key_policy: self.cache_key_policy,
            scheduler: self.scheduler.clone(),
        }
    }
}
