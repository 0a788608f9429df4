//! Cache (Redis) configuration model.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CACHE_ADDR: &str = "127.0.0.1:6379";
pub const DEFAULT_CACHE_POOL_SIZE: usize = 10;
pub const DEFAULT_CACHE_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CACHE_POOL_TIMEOUT: Duration = Duration::from_secs(4);

/// Configuration for the shared cache client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// `host:port`, or a full `redis://` / `rediss://` URL.
    pub addr: String,
    /// Never serialized.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    /// Extra attempts when acquiring a pooled connection fails.
    pub max_retries: u32,
    pub pool_size: usize,
    /// Connections opened eagerly when the client is created.
    #[serde(default)]
    pub min_idle_conns: usize,
    /// How long a caller waits for a free pooled connection.
    pub pool_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_CACHE_ADDR.to_string(),
            password: None,
            db: 0,
            max_retries: DEFAULT_CACHE_MAX_RETRIES,
            pool_size: DEFAULT_CACHE_POOL_SIZE,
            min_idle_conns: 0,
            pool_timeout: DEFAULT_CACHE_POOL_TIMEOUT,
        }
    }
}

impl CacheConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    /// Build the connection URL understood by the redis client.
    pub fn url(&self) -> Result<String, String> {
        let raw = if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("redis://{}", self.addr)
        };
        let mut url = Url::parse(&raw).map_err(|e| format!("Invalid cache address: {e}"))?;
        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(format!("Unsupported cache scheme: {}", url.scheme()));
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| "Cache address cannot carry a password".to_string())?;
        }
        url.set_path(&format!("/{}", self.db));
        Ok(url.to_string())
    }

    /// Pool size with a floor of one connection.
    pub fn pool_size_or_default(&self) -> usize {
        if self.pool_size == 0 {
            DEFAULT_CACHE_POOL_SIZE
        } else {
            self.pool_size
        }
    }

    pub fn pool_timeout_or_default(&self) -> Duration {
        if self.pool_timeout.is_zero() {
            DEFAULT_CACHE_POOL_TIMEOUT
        } else {
            self.pool_timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_host_port() {
        let config = CacheConfig::new("cache.local:6380");
        assert_eq!(config.url().unwrap(), "redis://cache.local:6380/0");
    }

    #[test]
    fn test_url_with_password_and_db() {
        let config = CacheConfig {
            password: Some("p@ss word".to_string()),
            db: 3,
            ..CacheConfig::new("localhost:6379")
        };
        let url = config.url().unwrap();
        assert!(url.starts_with("redis://:"));
        assert!(url.ends_with("@localhost:6379/3"));
        assert!(!url.contains("p@ss word"));
    }

    #[test]
    fn test_url_keeps_tls_scheme() {
        let config = CacheConfig::new("rediss://secure.example:6380");
        assert_eq!(config.url().unwrap(), "rediss://secure.example:6380/0");
    }

    #[test]
    fn test_url_rejects_other_schemes() {
        let config = CacheConfig::new("http://localhost:6379");
        assert!(config.url().unwrap_err().contains("Unsupported"));
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let config = CacheConfig {
            pool_size: 0,
            pool_timeout: Duration::ZERO,
            ..CacheConfig::default()
        };
        assert_eq!(config.pool_size_or_default(), DEFAULT_CACHE_POOL_SIZE);
        assert_eq!(config.pool_timeout_or_default(), DEFAULT_CACHE_POOL_TIMEOUT);
    }
}
