//! # synopsis-db
//!
//! Storage layer for synopsis.
//!
//! This crate provides:
//! - Connection pool management with bounded acquisition
//! - PostgreSQL + pgvector repository implementations
//! - An in-memory backend implementing the same repository traits
//! - The result cache and embedding store components built on them
//!
//! ## Example
//!
//! ```rust,ignore
//! use synopsis_db::{Database, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect_with_config("postgres://localhost/synopsis", PoolConfig::from_env()).await?;
//!     let storage = db.storage();
//!     storage.jobs.create("job-1", synopsis_db::JobType::Clustering).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod cache;
pub mod embedding_store;
pub mod embeddings;
pub mod jobs;
pub mod memory;
pub mod pool;
pub mod result_cache;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use synopsis_core::*;

pub use cache::PgCacheRepository;
pub use embedding_store::EmbeddingStore;
pub use embeddings::PgEmbeddingRepository;
pub use jobs::PgJobRepository;
pub use memory::{InMemoryCacheRepository, InMemoryEmbeddingRepository, InMemoryJobRepository};
pub use pool::{map_acquire_error, ConnectionPool, PoolConfig};
pub use result_cache::{CacheStats, ResultCache};

/// Repository handles for one storage backend, ready to inject.
#[derive(Clone)]
pub struct Storage {
    pub cache: Arc<dyn CacheRepository>,
    pub embeddings: Arc<dyn EmbeddingRepository>,
    pub jobs: Arc<dyn JobRepository>,
    /// Short backend label for health output and logs.
    pub backend: &'static str,
}

impl Storage {
    /// Fresh in-process backend.
    pub fn memory() -> Self {
        Self {
            cache: Arc::new(InMemoryCacheRepository::new()),
            embeddings: Arc::new(InMemoryEmbeddingRepository::new()),
            jobs: Arc::new(InMemoryJobRepository::new()),
            backend: "memory",
        }
    }
}

/// Combined database context with all Postgres repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: ConnectionPool,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = ConnectionPool::connect(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Connect with pool settings read from the environment.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::from_env()).await
    }

    /// Repository handles sharing this database's pool.
    pub fn storage(&self) -> Storage {
        Storage {
            cache: Arc::new(PgCacheRepository::new(self.pool.clone())),
            embeddings: Arc::new(PgEmbeddingRepository::new(self.pool.clone())),
            jobs: Arc::new(PgJobRepository::new(self.pool.clone())),
            backend: "postgres",
        }
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(self.pool.inner())
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}
