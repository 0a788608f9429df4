//! A named, live connection pool.

use crate::db::capability::{QueryCapability, RawHandle};
use crate::error::{DbError, DbResult};
use crate::models::{Dialect, PoolStats, SessionConfig};
use std::fmt;
use std::sync::Arc;

/// One configured connection pool to one backend.
///
/// Sessions are only built by the manager after the pool answered its
/// liveness probe, so a session always holds both handles.
pub struct Session {
    query: Arc<dyn QueryCapability>,
    raw: Arc<dyn RawHandle>,
    config: SessionConfig,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        query: Arc<dyn QueryCapability>,
        raw: Arc<dyn RawHandle>,
    ) -> Self {
        Self { query, raw, config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn driver(&self) -> &str {
        &self.config.driver
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.query.dialect()
    }

    pub fn query(&self) -> &Arc<dyn QueryCapability> {
        &self.query
    }

    pub fn raw(&self) -> &Arc<dyn RawHandle> {
        &self.raw
    }

    /// Probe the pool. Fails with `NoConnectionAvailable` once closed.
    pub async fn ping(&self) -> DbResult<()> {
        if self.raw.is_closed() {
            return Err(DbError::NoConnectionAvailable);
        }
        self.raw.ping().await
    }

    pub fn stats(&self) -> PoolStats {
        self.raw.stats()
    }

    pub async fn close(&self) -> DbResult<()> {
        self.raw.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.raw.is_closed()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.config.name)
            .field("driver", &self.config.driver)
            .field("dialect", &self.dialect())
            .field("connection", &self.config.masked_connection_string())
            .field("raw", &self.raw)
            .finish()
    }
}
