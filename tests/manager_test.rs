//! Connection manager behaviour, driven by an in-memory recording driver.
//!
//! The `mem` driver reads its behaviour from the connection string:
//! `mem://ok`, `mem://fail-open`, `mem://fail-ping`, `mem://fail-close`, `mem://hang`.

use async_trait::async_trait;
use futures_util::FutureExt;
use nest_db::db::{
    ConnectionManager, Driver, DriverRegistry, QueryCapability, QueryHook, RawHandle, Transaction,
};
use nest_db::cache::CacheClient;
use nest_db::error::{DbError, DbResult};
use nest_db::models::{CacheConfig, Dialect, JsonRow, PoolStats, PoolTuning, SessionConfig, SqlParam};
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    tunings: Mutex<Vec<PoolTuning>>,
}

impl Recorder {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

#[derive(Debug)]
struct MemHandle {
    target: String,
    recorder: Arc<Recorder>,
    closed: AtomicBool,
}

#[async_trait]
impl RawHandle for MemHandle {
    async fn ping(&self) -> DbResult<()> {
        self.recorder.record(format!("ping:{}", self.target));
        match self.target.as_str() {
            "hang" => std::future::pending().await,
            "fail-ping" => Err(DbError::connection("host unreachable", "check the host")),
            _ => Ok(()),
        }
    }

    fn stats(&self) -> PoolStats {
        let closed = self.closed.load(Ordering::SeqCst);
        PoolStats {
            max_open: 4,
            open: if closed { 0 } else { 1 },
            in_use: 0,
            idle: if closed { 0 } else { 1 },
            closed,
        }
    }

    async fn close(&self) -> DbResult<()> {
        self.recorder.record(format!("close:{}", self.target));
        if self.target == "fail-close" {
            return Err(DbError::internal("socket already gone"));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemQuery {
    recorder: Arc<Recorder>,
    hooks: Vec<Arc<dyn QueryHook>>,
}

#[async_trait]
impl QueryCapability for MemQuery {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn add_query_hook(&mut self, hook: Arc<dyn QueryHook>) {
        self.hooks.push(hook);
    }

    async fn execute(&self, sql: &str, _params: &[SqlParam]) -> DbResult<u64> {
        self.recorder.record(format!("execute:{sql}"));
        Ok(1)
    }

    async fn fetch_all(&self, _sql: &str, _params: &[SqlParam]) -> DbResult<Vec<JsonRow>> {
        Ok(Vec::new())
    }

    async fn begin(&self) -> DbResult<Box<dyn Transaction>> {
        self.recorder.record("begin");
        Ok(Box::new(MemTransaction {
            recorder: self.recorder.clone(),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemTransaction {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Transaction for MemTransaction {
    fn id(&self) -> &str {
        "tx_mem"
    }

    async fn execute(&mut self, sql: &str, _params: &[SqlParam]) -> DbResult<u64> {
        self.recorder.record(format!("tx_execute:{sql}"));
        Ok(1)
    }

    async fn fetch_all(&mut self, _sql: &str, _params: &[SqlParam]) -> DbResult<Vec<JsonRow>> {
        Ok(Vec::new())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.recorder.record("commit");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.recorder.record("rollback");
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct MemDriver {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Driver for MemDriver {
    fn name(&self) -> &str {
        "mem"
    }

    async fn open(
        &self,
        connection_string: &str,
        tuning: &PoolTuning,
    ) -> DbResult<Arc<dyn RawHandle>> {
        let target = connection_string.trim_start_matches("mem://").to_string();
        self.recorder.record(format!("open:{target}"));
        self.recorder.tunings.lock().unwrap().push(*tuning);
        if target == "fail-open" {
            return Err(DbError::connection("bad connection string", "fix it"));
        }
        Ok(Arc::new(MemHandle {
            target,
            recorder: self.recorder.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn wrap_for_querying(&self, raw: Arc<dyn RawHandle>) -> DbResult<Box<dyn QueryCapability>> {
        raw.as_any()
            .downcast_ref::<MemHandle>()
            .ok_or_else(|| DbError::internal("not a mem handle"))?;
        Ok(Box::new(MemQuery {
            recorder: self.recorder.clone(),
            hooks: Vec::new(),
        }))
    }
}

fn mem_manager() -> (ConnectionManager, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let mut manager = ConnectionManager::new(DriverRegistry::new());
    manager.register_driver(
        "mem",
        Arc::new(MemDriver {
            recorder: recorder.clone(),
        }),
    );
    (manager, recorder)
}

fn mem_config(name: &str, target: &str) -> SessionConfig {
    SessionConfig::new(name, "mem", format!("mem://{target}"))
}

#[tokio::test]
async fn test_scenario_single_mem_session() {
    let (mut manager, _) = mem_manager();
    manager.init(vec![mem_config("a", "ok")]).await.unwrap();

    assert!(manager.get_session("a").is_some());

    let health = manager.health_check(Duration::from_secs(1)).await;
    assert_eq!(health.len(), 1);
    assert!(health["a"].is_ok());

    manager.close_all().await.unwrap();

    // close_all closes handles but keeps the table
    let session = manager.get_session("a").expect("session still registered");
    assert!(session.is_closed());
    assert!(matches!(
        session.ping().await,
        Err(DbError::NoConnectionAvailable)
    ));
}

#[tokio::test]
async fn test_registered_driver_resolves() {
    let (mut manager, recorder) = mem_manager();
    manager.create_session(mem_config("main", "ok")).await.unwrap();

    let session = manager.get_session("main").unwrap();
    assert_eq!(session.name(), "main");
    assert_eq!(session.driver(), "mem");
    assert_eq!(session.dialect(), Dialect::Sqlite);
    assert_eq!(recorder.events(), vec!["open:ok", "ping:ok"]);
}

#[tokio::test]
async fn test_unregistered_driver_leaves_table_untouched() {
    let (mut manager, recorder) = mem_manager();
    manager.init(vec![mem_config("a", "ok")]).await.unwrap();

    let err = manager
        .init(vec![SessionConfig::new("b", "oracle", "oracle://host/db")])
        .await
        .unwrap_err();

    match err {
        DbError::SessionInit { name, source } => {
            assert_eq!(name, "b");
            assert!(matches!(*source, DbError::DriverNotFound { ref driver } if driver == "oracle"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(manager.session_names(), vec!["a"]);
    assert_eq!(recorder.count("open:"), 1);
}

#[tokio::test]
async fn test_init_keeps_sessions_created_before_failure() {
    let (mut manager, _) = mem_manager();
    let err = manager
        .init(vec![
            mem_config("a", "ok"),
            mem_config("b", "fail-open"),
            mem_config("c", "ok"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(&err, DbError::SessionInit { name, .. } if name == "b"));
    let message = err.to_string();
    assert!(message.contains("'b'"));
    assert!(!message.contains("'a'"));

    assert!(manager.get_session("a").is_some());
    assert!(manager.get_session("b").is_none());
    assert!(manager.get_session("c").is_none());
}

#[tokio::test]
async fn test_failed_ping_closes_handle_and_stores_nothing() {
    let (mut manager, recorder) = mem_manager();
    let err = manager
        .create_session(mem_config("flaky", "fail-ping"))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Ping { ref name, .. } if name == "flaky"));
    assert_eq!(manager.session_count(), 0);
    assert_eq!(recorder.count("close:fail-ping"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ping_is_bounded_by_deadline() {
    let (mut manager, recorder) = mem_manager();
    let err = manager
        .create_session(mem_config("slow", "hang"))
        .await
        .unwrap_err();

    match err {
        DbError::Ping { name, source } => {
            assert_eq!(name, "slow");
            assert!(matches!(*source, DbError::Timeout { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(recorder.count("close:hang"), 1);
    assert!(manager.get_session("slow").is_none());
}

#[tokio::test]
async fn test_duplicate_session_name_rejected_without_opening() {
    let (mut manager, recorder) = mem_manager();
    manager.create_session(mem_config("a", "ok")).await.unwrap();

    let err = manager
        .create_session(mem_config("a", "ok"))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::SessionExists { ref name } if name == "a"));
    assert_eq!(recorder.count("open:"), 1);
    assert_eq!(manager.session_count(), 1);
}

#[tokio::test]
async fn test_cache_name_is_reserved() {
    let (mut manager, recorder) = mem_manager();
    let err = manager
        .create_session(mem_config("cache", "ok"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert_eq!(recorder.count("open:"), 0);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let (mut manager, _) = mem_manager();
    let err = manager
        .create_session(mem_config("", "ok"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_only_positive_tuning_reaches_driver() {
    let (mut manager, recorder) = mem_manager();
    let config = mem_config("tuned", "ok")
        .with_max_open_conns(8)
        .with_conn_max_lifetime(Duration::from_secs(300));
    manager.create_session(config).await.unwrap();

    let tunings = recorder.tunings.lock().unwrap().clone();
    assert_eq!(
        tunings,
        vec![PoolTuning {
            max_open: Some(8),
            max_idle: None,
            max_lifetime: Some(Duration::from_secs(300)),
            max_idle_time: None,
        }]
    );
}

#[tokio::test]
async fn test_debug_attaches_query_hook() {
    let (mut manager, _) = mem_manager();
    manager
        .init(vec![
            mem_config("quiet", "ok"),
            mem_config("loud", "ok").with_debug(true),
        ])
        .await
        .unwrap();

    let hooks = |name: &str| {
        manager
            .get_session(name)
            .unwrap()
            .query()
            .as_any()
            .downcast_ref::<MemQuery>()
            .unwrap()
            .hooks
            .len()
    };
    assert_eq!(hooks("quiet"), 0);
    assert_eq!(hooks("loud"), 1);
}

#[tokio::test]
async fn test_health_check_reports_every_session() {
    let (mut manager, _) = mem_manager();
    manager
        .init(vec![mem_config("a", "ok"), mem_config("b", "ok")])
        .await
        .unwrap();
    // A session whose backend goes away after creation
    let fail = Arc::new(AtomicBool::new(false));
    manager.register_driver("mem-late", Arc::new(LateFailDriver { fail: fail.clone() }));
    manager
        .create_session(SessionConfig::new("c", "mem-late", "late://c"))
        .await
        .unwrap();
    fail.store(true, Ordering::SeqCst);

    let health = manager.health_check(Duration::from_secs(1)).await;
    assert_eq!(health.len(), 3);
    let failed: Vec<_> = health
        .iter()
        .filter(|(_, r)| r.is_err())
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(failed, vec!["c"]);
    assert!(matches!(&health["c"], Err(DbError::Ping { name, .. }) if name == "c"));
}

#[tokio::test(start_paused = true)]
async fn test_health_check_does_not_wait_on_hung_backend_forever() {
    let (mut manager, _) = mem_manager();
    let fail = Arc::new(AtomicBool::new(false));
    manager.register_driver("mem-late", Arc::new(LateFailDriver { fail: fail.clone() }));
    manager.create_session(mem_config("a", "ok")).await.unwrap();
    manager
        .create_session(SessionConfig::new("b", "mem-late", "late://hang"))
        .await
        .unwrap();
    fail.store(true, Ordering::SeqCst);

    let health = manager.health_check(Duration::from_millis(200)).await;
    assert!(health["a"].is_ok());
    match &health["b"] {
        Err(DbError::Ping { source, .. }) => {
            assert!(matches!(**source, DbError::Timeout { .. }))
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_close_all_attempts_every_session() {
    let (mut manager, recorder) = mem_manager();
    manager
        .init(vec![mem_config("bad", "fail-close"), mem_config("good", "ok")])
        .await
        .unwrap();

    let errors = manager.close_all().await.unwrap_err();

    assert_eq!(recorder.count("close:fail-close"), 1);
    assert_eq!(recorder.count("close:ok"), 1);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.names().collect::<Vec<_>>(), vec!["bad"]);
    assert!(errors.to_string().contains("bad"));
    assert!(!errors.to_string().contains("good"));

    assert!(manager.get_session("good").unwrap().is_closed());
    assert!(!manager.get_session("bad").unwrap().is_closed());
}

#[tokio::test]
async fn test_close_session_removes_it() {
    let (mut manager, recorder) = mem_manager();
    manager
        .init(vec![mem_config("a", "ok"), mem_config("b", "ok")])
        .await
        .unwrap();

    manager.close_session("a").await.unwrap();
    assert_eq!(manager.session_names(), vec!["b"]);
    assert_eq!(recorder.count("close:"), 1);

    assert!(matches!(
        manager.close_session("a").await,
        Err(DbError::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_with_transaction_unknown_session_skips_closure() {
    let (manager, recorder) = mem_manager();
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();

    let result: DbResult<()> = manager
        .with_transaction("missing", move |_tx| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        })
        .await;

    assert!(matches!(result, Err(DbError::SessionNotFound { ref name }) if name == "missing"));
    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(recorder.count("begin"), 0);
}

#[tokio::test]
async fn test_with_transaction_commits_on_success() {
    let (mut manager, recorder) = mem_manager();
    manager.create_session(mem_config("a", "ok")).await.unwrap();

    let affected = manager
        .with_transaction("a", |tx| {
            async move { tx.execute("UPDATE t SET x = 1", &[]).await }.boxed()
        })
        .await
        .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(
        recorder.events()[2..].to_vec(),
        vec!["begin", "tx_execute:UPDATE t SET x = 1", "commit"]
    );
}

#[tokio::test]
async fn test_with_transaction_rolls_back_and_returns_closure_error() {
    let (mut manager, recorder) = mem_manager();
    manager.create_session(mem_config("a", "ok")).await.unwrap();

    let result: DbResult<()> = manager
        .with_transaction("a", |tx| {
            async move {
                tx.execute("DELETE FROM t", &[]).await?;
                Err(DbError::invalid_input("balance would go negative"))
            }
            .boxed()
        })
        .await;

    assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    assert_eq!(recorder.count("rollback"), 1);
    assert_eq!(recorder.count("commit"), 0);
}

#[tokio::test]
async fn test_connection_stats_stable_shape() {
    let (mut manager, _) = mem_manager();
    manager
        .init(vec![mem_config("a", "ok"), mem_config("b", "ok")])
        .await
        .unwrap();

    let first: HashSet<String> = manager.connection_stats().into_keys().collect();
    let second: HashSet<String> = manager.connection_stats().into_keys().collect();
    assert_eq!(first, second);
    assert_eq!(first, HashSet::from(["a".to_string(), "b".to_string()]));

    let stats = manager.connection_stats();
    let a = stats["a"].as_sql().unwrap();
    assert_eq!(a.max_open, 4);
    assert!(!a.closed);
}

#[tokio::test]
async fn test_query_capability_lookup() {
    let (mut manager, _) = mem_manager();
    manager.create_session(mem_config("a", "ok")).await.unwrap();

    let query = manager.query_capability("a").unwrap();
    assert_eq!(query.execute("SELECT 1", &[]).await.unwrap(), 1);
    assert!(matches!(
        manager.query_capability("nope"),
        Err(DbError::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_init_cache_failure_leaves_holder_empty() {
    let (mut manager, _) = mem_manager();
    // Nothing listens on port 1
    let config = CacheConfig {
        max_retries: 0,
        pool_timeout: Duration::from_millis(500),
        ..CacheConfig::new("127.0.0.1:1")
    };

    let err = manager.init_cache(config).await.unwrap_err();
    assert!(matches!(err, DbError::Ping { ref name, .. } if name == "cache"));
    assert!(manager.cache_client().is_none());
    assert!(!manager.connection_stats().contains_key("cache"));
}

#[tokio::test]
async fn test_cache_is_reported_and_closed_with_sessions() {
    let (mut manager, _) = mem_manager();
    manager.init([mem_config("a", "ok")]).await.unwrap();

    // Nothing listens on port 1
    let config = CacheConfig {
        max_retries: 0,
        pool_timeout: Duration::from_millis(500),
        ..CacheConfig::new("127.0.0.1:1")
    };
    manager.set_cache_client(CacheClient::build(&config).unwrap());

    let health = manager.health_check(Duration::from_secs(2)).await;
    assert_eq!(health.len(), 2);
    assert!(health["a"].is_ok());
    assert!(matches!(health["cache"], Err(DbError::Ping { ref name, .. }) if name == "cache"));

    let stats = manager.connection_stats();
    assert_eq!(stats.len(), 2);
    assert!(stats.contains_key("cache"));

    manager.close_all().await.unwrap();
    assert!(manager.cache_client().unwrap().is_closed());
    assert!(manager.connection_stats()["a"].as_sql().unwrap().closed);
}

#[tokio::test]
async fn test_replacing_cache_client_closes_previous() {
    let (mut manager, _) = mem_manager();
    let first = CacheClient::build(&CacheConfig::new("127.0.0.1:1")).unwrap();
    let first_pool = first.pool().clone();
    manager.set_cache_client(first);
    manager.set_cache_client(CacheClient::build(&CacheConfig::new("127.0.0.1:1")).unwrap());

    assert!(first_pool.is_closed());
    assert!(!manager.cache_client().unwrap().is_closed());
}

#[tokio::test]
async fn test_session_names_are_free_form() {
    let (mut manager, recorder) = mem_manager();
    manager
        .init([mem_config("reports.v2", "ok"), mem_config("eu west", "ok")])
        .await
        .unwrap();
    assert_eq!(manager.session_names(), vec!["eu west", "reports.v2"]);
    assert_eq!(recorder.count("open:"), 2);
}

#[tokio::test]
async fn test_opaque_connection_string_is_logged_safely() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (mut manager, recorder) = mem_manager();
    let config = SessionConfig::new(
        "bi",
        "mem",
        "user id=svc@corp;password=x;server=sqlserver://h",
    );
    manager.init([config]).await.unwrap();

    assert_eq!(manager.session_count(), 1);
    assert_eq!(recorder.count("open:"), 1);
}

/// A driver whose handles start failing their ping once the switch is flipped.
struct LateFailDriver {
    fail: Arc<AtomicBool>,
}

#[derive(Debug)]
struct LateHandle {
    target: String,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Driver for LateFailDriver {
    fn name(&self) -> &str {
        "mem-late"
    }

    async fn open(&self, connection_string: &str, _: &PoolTuning) -> DbResult<Arc<dyn RawHandle>> {
        Ok(Arc::new(LateHandle {
            target: connection_string.trim_start_matches("late://").to_string(),
            fail: self.fail.clone(),
        }))
    }

    fn wrap_for_querying(&self, _raw: Arc<dyn RawHandle>) -> DbResult<Box<dyn QueryCapability>> {
        Ok(Box::new(MemQuery {
            recorder: Arc::new(Recorder::default()),
            hooks: Vec::new(),
        }))
    }
}

#[async_trait]
impl RawHandle for LateHandle {
    async fn ping(&self) -> DbResult<()> {
        if !self.fail.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.target == "hang" {
            std::future::pending::<()>().await;
        }
        Err(DbError::connection("connection reset", "check the server"))
    }

    fn stats(&self) -> PoolStats {
        PoolStats::default()
    }

    async fn close(&self) -> DbResult<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
