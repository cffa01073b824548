//! Content-addressed result cache.
//!
//! Maps SHA-256(raw input) to a previously computed artifact. Entries are
//! write-once: the first artifact stored for a fingerprint is the one every
//! later reader sees.
//!
//! The cache never fails its caller. A missing backend turns both operations
//! into no-ops, and backend errors (unreachable store, pool exhaustion) are
//! logged and degrade to a miss or a skipped store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use synopsis_core::{CacheRepository, Fingerprint};

/// Result cache over an optional [`CacheRepository`].
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<ResultCacheInner>,
}

struct ResultCacheInner {
    /// Storage backend (None if disabled).
    repo: Option<Arc<dyn CacheRepository>>,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl ResultCache {
    /// Create a cache backed by `repo`.
    pub fn new(repo: Arc<dyn CacheRepository>) -> Self {
        Self::build(Some(repo))
    }

    /// Create a disabled cache: `get` always misses, `put` stores nothing.
    pub fn disabled() -> Self {
        Self::build(None)
    }

    fn build(repo: Option<Arc<dyn CacheRepository>>) -> Self {
        Self {
            inner: Arc::new(ResultCacheInner {
                repo,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
        }
    }

    /// Check if a backend is configured.
    pub fn is_enabled(&self) -> bool {
        self.inner.repo.is_some()
    }

    /// Look up the artifact stored for `raw_input`.
    pub async fn get(&self, raw_input: &str) -> Option<String> {
        let repo = self.inner.repo.as_ref()?;
        let fingerprint = Fingerprint::of(raw_input);

        match repo.get(&fingerprint).await {
            Ok(Some(artifact)) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subsystem = "cache",
                    op = "get",
                    fingerprint = %fingerprint.short(),
                    "Cache HIT"
                );
                Some(artifact)
            }
            Ok(None) => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subsystem = "cache",
                    op = "get",
                    fingerprint = %fingerprint.short(),
                    "Cache MISS"
                );
                None
            }
            Err(e) => {
                self.inner.errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subsystem = "cache",
                    op = "get",
                    fingerprint = %fingerprint.short(),
                    error = %e,
                    "Cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    /// Store `artifact` for `raw_input` unless `skip` is set or an entry
    /// already exists.
    pub async fn put(&self, raw_input: &str, artifact: &str, skip: bool) {
        if skip {
            return;
        }
        let Some(repo) = self.inner.repo.as_ref() else {
            return;
        };
        let fingerprint = Fingerprint::of(raw_input);

        match repo.insert_if_absent(&fingerprint, artifact).await {
            Ok(inserted) => {
                debug!(
                    subsystem = "cache",
                    op = "put",
                    fingerprint = %fingerprint.short(),
                    inserted,
                    "Cache SET"
                );
            }
            Err(e) => {
                self.inner.errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subsystem = "cache",
                    op = "put",
                    fingerprint = %fingerprint.short(),
                    error = %e,
                    "Cache store failed, skipping"
                );
            }
        }
    }

    /// Snapshot of hit/miss/error counters since startup.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            errors: self.inner.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCacheRepository;
    use async_trait::async_trait;
    use synopsis_core::{Error, Result};

    /// Backend that fails every call, as an unreachable store would.
    struct BrokenRepo;

    #[async_trait]
    impl CacheRepository for BrokenRepo {
        async fn get(&self, _fingerprint: &Fingerprint) -> Result<Option<String>> {
            Err(Error::ResourceUnavailable("pool exhausted".into()))
        }

        async fn insert_if_absent(&self, _fingerprint: &Fingerprint, _artifact: &str) -> Result<bool> {
            Err(Error::ResourceUnavailable("pool exhausted".into()))
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = ResultCache::new(Arc::new(InMemoryCacheRepository::new()));

        cache.put("hello", "summary-A", false).await;
        assert_eq!(cache.get("hello").await.as_deref(), Some("summary-A"));
        assert!(cache.get("world").await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = ResultCache::new(Arc::new(InMemoryCacheRepository::new()));

        cache.put("hello", "summary-A", false).await;
        cache.put("hello", "summary-B", false).await;
        assert_eq!(cache.get("hello").await.as_deref(), Some("summary-A"));
    }

    #[tokio::test]
    async fn test_skip_stores_nothing() {
        let repo = Arc::new(InMemoryCacheRepository::new());
        let cache = ResultCache::new(repo.clone());

        cache.put("hello", "summary-A", true).await;
        assert!(repo.is_empty().await);
        assert!(cache.get("hello").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let cache = ResultCache::disabled();
        assert!(!cache.is_enabled());

        cache.put("hello", "summary-A", false).await;
        assert!(cache.get("hello").await.is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_miss() {
        let cache = ResultCache::new(Arc::new(BrokenRepo));

        cache.put("hello", "summary-A", false).await;
        assert!(cache.get("hello").await.is_none());
        assert_eq!(cache.stats().errors, 2);
    }

    #[tokio::test]
    async fn test_concurrent_puts_converge() {
        let cache = ResultCache::new(Arc::new(InMemoryCacheRepository::new()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.put("shared", &format!("artifact-{i}"), false).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let winner = cache.get("shared").await.unwrap();
        assert!(winner.starts_with("artifact-"));
        assert_eq!(cache.get("shared").await.unwrap(), winner);
    }
}
