//! The connection manager: named sessions over registered drivers.
//!
//! Startup and shutdown mutate the manager through `&mut self`. Once every
//! session is created the manager is typically wrapped in an `Arc` and its
//! `&self` operations are shared across tasks; no internal locking is needed.

use crate::cache::CacheClient;
use crate::db::capability::{QueryCapability, Transaction};
use crate::db::driver::{Driver, DriverRegistry};
use crate::db::hook::TracingQueryHook;
use crate::db::session::Session;
use crate::error::{CloseErrors, DbError, DbResult};
use crate::models::{CacheConfig, ConnectionStats, PoolTuning, SessionConfig};
use futures_util::future::{BoxFuture, join_all};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Deadline of the liveness probe run while creating a session.
pub const SESSION_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Key of the cache entry in health and stats reports.
pub const CACHE_KEY: &str = "cache";

pub struct ConnectionManager {
    drivers: DriverRegistry,
    sessions: HashMap<String, Session>,
    cache: Option<CacheClient>,
}

impl ConnectionManager {
    /// Create an empty manager resolving drivers from `drivers`.
    pub fn new(drivers: DriverRegistry) -> Self {
        Self {
            drivers,
            sessions: HashMap::new(),
            cache: None,
        }
    }

    /// An empty manager with the built-in drivers registered.
    pub fn with_builtin_drivers() -> Self {
        Self::new(DriverRegistry::with_builtin_drivers())
    }

    pub fn register_driver(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        self.drivers.register(name, driver);
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Create a session for each config, in order.
    ///
    /// Stops at the first failure and reports the failing config's name.
    /// Sessions created before the failure stay registered.
    pub async fn init<I>(&mut self, configs: I) -> DbResult<()>
    where
        I: IntoIterator<Item = SessionConfig>,
    {
        for config in configs {
            let name = config.name.clone();
            if let Err(e) = self.create_session(config).await {
                error!(session = %name, error = %e, "Failed to create session");
                return Err(DbError::session_init(name, e));
            }
        }
        info!(sessions = self.sessions.len(), "Connection manager initialized");
        Ok(())
    }

    /// Open, tune, wrap and probe one session, then store it under its name.
    ///
    /// Nothing is stored unless every step succeeds. A handle that fails its
    /// probe is closed before returning.
    pub async fn create_session(&mut self, config: SessionConfig) -> DbResult<()> {
        config
            .validate()
            .map_err(|e| DbError::invalid_input(e.to_string()))?;
        if config.name == CACHE_KEY {
            return Err(DbError::invalid_input(format!(
                "session name '{}' is reserved for the cache",
                CACHE_KEY
            )));
        }
        if self.sessions.contains_key(&config.name) {
            return Err(DbError::session_exists(&config.name));
        }

        let driver = self
            .drivers
            .lookup(&config.driver)
            .ok_or_else(|| DbError::driver_not_found(&config.driver))?;

        info!(
            session = %config.name,
            driver = %config.driver,
            connection = %config.masked_connection_string(),
            "Opening session"
        );

        let tuning = PoolTuning::from_config(&config);
        if !tuning.is_default() {
            debug!(session = %config.name, tuning = ?tuning, "Applying pool tuning");
        }
        let raw = driver
            .open(&config.connection_string, &tuning)
            .await
            .map_err(|e| DbError::open(&config.driver, e))?;

        let mut query = match driver.wrap_for_querying(raw.clone()) {
            Ok(query) => query,
            Err(e) => {
                close_quietly(&config.name, raw.close()).await;
                return Err(e);
            }
        };
        if config.debug {
            query.add_query_hook(Arc::new(TracingQueryHook::new(&config.name)));
        }

        if let Err(e) = bounded(SESSION_PING_TIMEOUT, "ping", raw.ping()).await {
            close_quietly(&config.name, raw.close()).await;
            return Err(DbError::ping(&config.name, e));
        }

        info!(
            session = %config.name,
            driver = %config.driver,
            dialect = %query.dialect(),
            "Session ready"
        );
        let name = config.name.clone();
        self.sessions
            .insert(name, Session::new(config, Arc::from(query), raw));
        Ok(())
    }

    pub fn get_session(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    pub fn query_capability(&self, name: &str) -> DbResult<Arc<dyn QueryCapability>> {
        self.sessions
            .get(name)
            .map(|session| session.query().clone())
            .ok_or_else(|| DbError::session_not_found(name))
    }

    /// Session names, sorted.
    pub fn session_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Build, warm up and probe a cache client, then store it.
    ///
    /// On failure any previously stored client is kept. A successful call
    /// closes the client it replaces.
    pub async fn init_cache(&mut self, config: CacheConfig) -> DbResult<()> {
        let client = CacheClient::connect(&config).await?;
        self.set_cache_client(client);
        Ok(())
    }

    /// Store an already built cache client without probing it, closing the one it replaces.
    pub fn set_cache_client(&mut self, client: CacheClient) {
        if let Some(previous) = self.cache.replace(client) {
            previous.close();
            info!("Closed superseded cache client");
        }
    }

    pub fn cache_client(&self) -> Option<&CacheClient> {
        self.cache.as_ref()
    }

    /// Probe every session and the cache, each bounded by `timeout`.
    ///
    /// Every entry gets a result; one failing backend never hides the others.
    pub async fn health_check(&self, timeout: Duration) -> HashMap<String, DbResult<()>> {
        let probes = self.sessions.iter().map(|(name, session)| async move {
            let result = bounded(timeout, "ping", session.ping())
                .await
                .map_err(|e| DbError::ping(name, e));
            (name.clone(), result)
        });
        let mut results: HashMap<String, DbResult<()>> =
            join_all(probes).await.into_iter().collect();

        if let Some(cache) = &self.cache {
            let result = bounded(timeout, "ping", cache.ping())
                .await
                .map_err(|e| DbError::ping(CACHE_KEY, e));
            results.insert(CACHE_KEY.to_string(), result);
        }

        for (name, result) in &results {
            if let Err(e) = result {
                warn!(resource = %name, error = %e, "Health check failed");
            }
        }
        results
    }

    /// Snapshot pool statistics of every session, plus the cache.
    pub fn connection_stats(&self) -> HashMap<String, ConnectionStats> {
        let mut stats: HashMap<String, ConnectionStats> = self
            .sessions
            .iter()
            .map(|(name, session)| (name.clone(), ConnectionStats::Sql(session.stats())))
            .collect();
        if let Some(cache) = &self.cache {
            stats.insert(CACHE_KEY.to_string(), ConnectionStats::Cache(cache.stats()));
        }
        stats
    }

    /// Run `f` inside a transaction on the named session.
    ///
    /// Commits when `f` succeeds. When `f` fails the transaction is rolled
    /// back and `f`'s error is returned; a rollback failure is only logged.
    ///
    /// ```ignore
    /// manager
    ///     .with_transaction("main", |tx| {
    ///         Box::pin(async move {
    ///             tx.execute("UPDATE accounts SET balance = 0", &[]).await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_transaction<T, F>(&self, name: &str, f: F) -> DbResult<T>
    where
        F: for<'tx> FnOnce(&'tx mut dyn Transaction) -> BoxFuture<'tx, DbResult<T>> + Send,
        T: Send,
    {
        let session = self
            .sessions
            .get(name)
            .ok_or_else(|| DbError::session_not_found(name))?;

        let mut tx = session
            .query()
            .begin()
            .await
            .map_err(|e| DbError::transaction(name, format!("begin failed: {}", e)))?;
        let transaction_id = tx.id().to_string();

        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        session = %name,
                        transaction_id = %transaction_id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Close one session and remove it from the table.
    pub async fn close_session(&mut self, name: &str) -> DbResult<()> {
        let session = self
            .sessions
            .remove(name)
            .ok_or_else(|| DbError::session_not_found(name))?;
        session.close().await.map_err(|e| DbError::close(name, e))?;
        info!(session = %name, "Session closed");
        Ok(())
    }

    /// Close every session handle and the cache, collecting every failure.
    ///
    /// The session table is left in place; its sessions report
    /// `NoConnectionAvailable` afterwards.
    pub async fn close_all(&self) -> Result<(), CloseErrors> {
        let mut errors = CloseErrors::new();
        for name in self.session_names() {
            let Some(session) = self.sessions.get(&name) else {
                continue;
            };
            match session.close().await {
                Ok(()) => info!(session = %name, "Session closed"),
                Err(e) => {
                    warn!(session = %name, error = %e, "Failed to close session");
                    errors.push(name.clone(), DbError::close(&name, e));
                }
            }
        }
        if let Some(cache) = &self.cache {
            cache.close();
            info!("Cache client closed");
        }
        if errors.is_empty() {
            info!("All connections closed");
        }
        errors.into_result()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::with_builtin_drivers()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("drivers", &self.drivers)
            .field("sessions", &self.session_names())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

async fn bounded<F>(timeout: Duration, operation: &str, probe: F) -> DbResult<()>
where
    F: Future<Output = DbResult<()>>,
{
    match tokio::time::timeout(timeout, probe).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(operation, timeout)),
    }
}

async fn close_quietly<F>(name: &str, close: F)
where
    F: Future<Output = DbResult<()>>,
{
    if let Err(e) = close.await {
        warn!(session = %name, error = %e, "Failed to close handle after failed setup");
    }
}
