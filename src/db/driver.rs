//! Driver trait and the registry the manager resolves driver names against.

use crate::db::capability::{QueryCapability, RawHandle};
use crate::error::DbResult;
use crate::models::PoolTuning;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A backend adapter. Implementations hold no per-session state.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Registry key, e.g. `"postgres"`.
    fn name(&self) -> &str;

    /// Build a pooled handle for `connection_string`, passed through unmodified.
    ///
    /// Only the positive fields of `tuning` are applied. Opening does not
    /// contact the server; liveness is checked separately by the caller.
    async fn open(
        &self,
        connection_string: &str,
        tuning: &PoolTuning,
    ) -> DbResult<Arc<dyn RawHandle>>;

    /// Bind a handle produced by this driver's `open` to its SQL dialect.
    fn wrap_for_querying(&self, raw: Arc<dyn RawHandle>) -> DbResult<Box<dyn QueryCapability>>;
}

/// Mapping from driver name to driver.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the PostgreSQL, MySQL, SQLite and SQL Server adapters.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::db::drivers::register_builtin(&mut registry);
        registry
    }

    /// Insert `driver` under `name`. A later registration under the same name wins.
    pub fn register(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        let name = name.into();
        if self.drivers.insert(name.clone(), driver).is_some() {
            debug!(driver = %name, "Replaced registered driver");
        } else {
            debug!(driver = %name, "Registered driver");
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}
