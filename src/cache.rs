//! Pooled Redis client held by the connection manager.

use crate::error::{DbError, DbResult};
use crate::models::{CacheConfig, CacheStats};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, PoolError, Runtime};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deadline for warming up and probing a new client.
pub const CACHE_PING_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(8);
const MAX_RETRY_BACKOFF: Duration = Duration::from_millis(512);

#[derive(Clone)]
pub struct CacheClient {
    pool: Pool,
    max_retries: u32,
}

impl CacheClient {
    /// Build the pool without contacting the server.
    pub fn build(config: &CacheConfig) -> DbResult<Self> {
        let url = config.url().map_err(DbError::cache)?;
        let mut cfg = Config::from_url(url);

        let mut pool_config = PoolConfig::new(config.pool_size_or_default());
        pool_config.timeouts.wait = Some(config.pool_timeout_or_default());
        cfg.pool = Some(pool_config);

        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self {
            pool,
            max_retries: config.max_retries,
        })
    }

    /// Build the pool, open `min_idle_conns` connections and probe the server,
    /// all within [`CACHE_PING_TIMEOUT`].
    pub async fn connect(config: &CacheConfig) -> DbResult<Self> {
        let client = Self::build(config)?;
        let warm = config.min_idle_conns.min(config.pool_size_or_default());

        let ready = async {
            client.warm_up(warm).await?;
            client.ping().await
        };
        let result = match tokio::time::timeout(CACHE_PING_TIMEOUT, ready).await {
            Ok(result) => result,
            Err(_) => Err(DbError::timeout("cache ping", CACHE_PING_TIMEOUT)),
        };
        if let Err(e) = result {
            client.close();
            return Err(DbError::ping("cache", e));
        }

        info!(addr = %config.addr, db = config.db, warm, "Cache client ready");
        Ok(client)
    }

    async fn warm_up(&self, count: usize) -> DbResult<()> {
        let mut held = Vec::with_capacity(count);
        for _ in 0..count {
            held.push(self.pool.get().await?);
        }
        debug!(connections = held.len(), "Cache pool warmed up");
        Ok(())
    }

    /// Get a pooled connection, retrying up to `max_retries` times.
    pub async fn connection(&self) -> DbResult<Connection> {
        let mut backoff = MIN_RETRY_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.pool.get().await {
                Ok(conn) => return Ok(conn),
                Err(PoolError::Closed) => return Err(DbError::NoConnectionAvailable),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "Retrying cache connection");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                }
                Err(e) => {
                    warn!(attempts = attempt + 1, error = %e, "Cache connection failed");
                    return Err(e.into());
                }
            }
        }
    }

    pub async fn ping(&self) -> DbResult<()> {
        if self.pool.is_closed() {
            return Err(DbError::NoConnectionAvailable);
        }
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let status = self.pool.status();
        CacheStats {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Close the pool. Connections in use are dropped when returned.
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("status", &self.pool.status())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
