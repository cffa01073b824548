//! Database connection pool management.
//!
//! Every repository borrows a connection for exactly one logical operation
//! and gives it back through [`ConnectionPool::settle`] (or by committing /
//! dropping a transaction). Nothing holds a connection across operations.

use std::time::{Duration, Instant};

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info, warn};

use synopsis_core::{defaults, Error, Result};

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// How long `acquire` waits for a free connection.
    pub acquire_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            min_connections: defaults::DB_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(defaults::DB_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DB_MAX_CONNECTIONS` | `10` | Pool capacity |
    /// | `DB_MIN_CONNECTIONS` | `1` | Connections kept open |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` | Bounded wait before `ResourceUnavailable` |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.max_connections)
            .max(1);

        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.min_connections)
            .min(max_connections);

        let acquire_timeout = std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);

        Self {
            max_connections,
            min_connections,
            acquire_timeout,
            ..defaults
        }
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    fn options(&self) -> PgPoolOptions {
        let mut options = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .test_before_acquire(true);

        if let Some(max_lifetime) = self.max_lifetime {
            options = options.max_lifetime(max_lifetime);
        }
        options
    }
}

/// Bounded pool of Postgres connections.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    pool: PgPool,
}

impl ConnectionPool {
    /// Connect eagerly, opening `min_connections` up front.
    pub async fn connect(database_url: &str, config: PoolConfig) -> Result<Self> {
        let start = Instant::now();

        info!(
            subsystem = "db",
            component = "pool",
            op = "create",
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Creating database connection pool"
        );

        let pool = config
            .options()
            .connect(database_url)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "pool",
            op = "established",
            pool_size = pool.size(),
            pool_idle = pool.num_idle(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Database connection pool established"
        );
        Ok(Self { pool })
    }

    /// Build the pool without opening any connection yet.
    pub fn connect_lazy(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = config
            .options()
            .connect_lazy(database_url)
            .map_err(Error::Database)?;
        Ok(Self { pool })
    }

    /// The underlying sqlx pool.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Borrow a connection, waiting at most the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(map_acquire_error)
    }

    /// Borrow a connection and open a transaction on it.
    ///
    /// Dropping the transaction without committing rolls it back and returns
    /// the connection.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(map_acquire_error)
    }

    /// Give a borrowed connection back after one operation.
    ///
    /// A connection whose operation failed at the transport level is detached
    /// and closed instead of returned; the pool opens a replacement on demand.
    pub fn settle<T>(
        &self,
        conn: PoolConnection<Postgres>,
        result: std::result::Result<T, sqlx::Error>,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                drop(conn);
                Ok(value)
            }
            Err(err) => {
                if is_connection_fault(&err) {
                    warn!(
                        subsystem = "db",
                        component = "pool",
                        op = "discard",
                        error = %err,
                        "Discarding broken connection"
                    );
                    drop(conn.detach());
                } else {
                    drop(conn);
                }
                Err(Error::Database(err))
            }
        }
    }

    /// Number of open connections.
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    /// Number of idle connections.
    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    /// Log current pool health metrics.
    ///
    /// Warns when no idle connection is left (potential exhaustion).
    pub fn log_metrics(&self) {
        let size = self.size();
        let idle = self.num_idle();

        debug!(
            subsystem = "db",
            component = "pool",
            op = "metrics",
            pool_size = size,
            pool_idle = idle,
            "Pool health check"
        );

        if idle == 0 && size > 0 {
            warn!(
                subsystem = "db",
                component = "pool",
                pool_size = size,
                "Connection pool has no idle connections, potential exhaustion"
            );
        }
    }

    /// Close every connection and reject further acquires.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map a pool acquisition failure into the error taxonomy.
pub fn map_acquire_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::PoolTimedOut => {
            Error::ResourceUnavailable("timed out waiting for a database connection".into())
        }
        sqlx::Error::PoolClosed => {
            Error::ResourceUnavailable("database connection pool is closed".into())
        }
        other => Error::Database(other),
    }
}

/// True for failures that leave the connection itself unusable.
fn is_connection_fault(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::Protocol(_) | sqlx::Error::Tls(_)
    )
}
