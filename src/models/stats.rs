//! Pool statistics snapshots returned by `connection_stats`.

use serde::Serialize;

/// Connection counts of one SQL session pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured upper bound on open connections.
    pub max_open: u32,
    /// Connections currently open (in use + idle).
    pub open: u32,
    pub in_use: u32,
    pub idle: u32,
    /// The pool has been closed and hands out no more connections.
    pub closed: bool,
}

/// Connection counts of the cache pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    /// Callers waiting for a connection.
    pub waiting: usize,
}

/// Statistics entry keyed by session name, or `"cache"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionStats {
    Sql(PoolStats),
    Cache(CacheStats),
}

impl ConnectionStats {
    pub fn as_sql(&self) -> Option<&PoolStats> {
        match self {
            Self::Sql(stats) => Some(stats),
            Self::Cache(_) => None,
        }
    }

    pub fn as_cache(&self) -> Option<&CacheStats> {
        match self {
            Self::Cache(stats) => Some(stats),
            Self::Sql(_) => None,
        }
    }
}
