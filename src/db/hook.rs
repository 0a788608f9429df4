//! Query observers attached to a query capability in debug mode.

use crate::error::DbError;
use crate::models::SqlParam;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Environment variable overriding the level of [`TracingQueryHook`].
pub const DEBUG_ENV_VAR: &str = "NEST_DB_DEBUG";

/// Observer of statements run through a query capability.
///
/// Hooks only emit side effects; they never see mutable results.
pub trait QueryHook: Send + Sync {
    fn before_query(&self, sql: &str, params: &[SqlParam]);

    /// `outcome` carries the affected or returned row count on success.
    fn after_query(&self, sql: &str, elapsed: Duration, outcome: Result<u64, &DbError>);
}

/// How much [`TracingQueryHook`] logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookLevel {
    Off,
    /// Only failed statements
    Errors,
    /// Every statement
    All,
}

impl HookLevel {
    /// Parse `0`/`1`/`2`, or the names `off`/`errors`/`all`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "0" | "off" | "false" => Some(Self::Off),
            "1" | "errors" | "error" => Some(Self::Errors),
            "2" | "all" | "true" => Some(Self::All),
            _ => None,
        }
    }

    /// Read [`DEBUG_ENV_VAR`], defaulting to [`HookLevel::All`].
    pub fn from_env() -> Self {
        std::env::var(DEBUG_ENV_VAR)
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or(Self::All)
    }
}

/// Logs statements at target `nest_db::query`.
#[derive(Debug, Clone)]
pub struct TracingQueryHook {
    session: String,
    level: HookLevel,
}

impl TracingQueryHook {
    pub fn new(session: impl Into<String>) -> Self {
        Self::with_level(session, HookLevel::from_env())
    }

    pub fn with_level(session: impl Into<String>, level: HookLevel) -> Self {
        Self {
            session: session.into(),
            level,
        }
    }

    pub fn level(&self) -> HookLevel {
        self.level
    }
}

impl QueryHook for TracingQueryHook {
    fn before_query(&self, sql: &str, params: &[SqlParam]) {
        if self.level == HookLevel::All {
            debug!(
                target: "nest_db::query",
                session = %self.session,
                sql = %sql,
                params = params.len(),
                "Executing query"
            );
        }
    }

    fn after_query(&self, sql: &str, elapsed: Duration, outcome: Result<u64, &DbError>) {
        match outcome {
            Err(e) if self.level != HookLevel::Off => {
                warn!(
                    target: "nest_db::query",
                    session = %self.session,
                    sql = %sql,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Query failed"
                );
            }
            Ok(rows) if self.level == HookLevel::All => {
                debug!(
                    target: "nest_db::query",
                    session = %self.session,
                    elapsed_ms = elapsed.as_millis() as u64,
                    rows = rows,
                    "Query finished"
                );
            }
            _ => {}
        }
    }
}

/// The hooks attached to one capability, shared with its transactions.
#[derive(Clone, Default)]
pub struct QueryHooks {
    hooks: Vec<Arc<dyn QueryHook>>,
}

impl QueryHooks {
    pub fn push(&mut self, hook: Arc<dyn QueryHook>) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Notify every hook and return the start instant for [`finish`](Self::finish).
    pub fn start(&self, sql: &str, params: &[SqlParam]) -> Instant {
        for hook in &self.hooks {
            hook.before_query(sql, params);
        }
        Instant::now()
    }

    pub fn finish(&self, sql: &str, started: Instant, outcome: Result<u64, &DbError>) {
        if self.hooks.is_empty() {
            return;
        }
        let elapsed = started.elapsed();
        for hook in &self.hooks {
            hook.after_query(sql, elapsed, outcome);
        }
    }
}

impl std::fmt::Debug for QueryHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHooks")
            .field("count", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl QueryHook for Recorder {
        fn before_query(&self, sql: &str, _params: &[SqlParam]) {
            self.events.lock().unwrap().push(format!("before {sql}"));
        }

        fn after_query(&self, sql: &str, _elapsed: Duration, outcome: Result<u64, &DbError>) {
            let status = match outcome {
                Ok(n) => format!("ok {n}"),
                Err(_) => "err".to_string(),
            };
            self.events.lock().unwrap().push(format!("after {sql} {status}"));
        }
    }

    #[test]
    fn test_hook_level_parse() {
        assert_eq!(HookLevel::parse("0"), Some(HookLevel::Off));
        assert_eq!(HookLevel::parse("1"), Some(HookLevel::Errors));
        assert_eq!(HookLevel::parse(" ALL "), Some(HookLevel::All));
        assert_eq!(HookLevel::parse("verbose"), None);
    }

    #[test]
    fn test_hooks_see_before_and_after() {
        let recorder = Arc::new(Recorder::default());
        let mut hooks = QueryHooks::default();
        hooks.push(recorder.clone());

        let started = hooks.start("SELECT 1", &[]);
        hooks.finish("SELECT 1", started, Ok(1));
        let err = DbError::internal("boom");
        let started = hooks.start("SELECT x", &[SqlParam::Int(1)]);
        hooks.finish("SELECT x", started, Err(&err));

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "before SELECT 1",
                "after SELECT 1 ok 1",
                "before SELECT x",
                "after SELECT x err",
            ]
        );
    }

    #[test]
    fn test_tracing_hook_level_is_kept() {
        let hook = TracingQueryHook::with_level("main", HookLevel::Errors);
        assert_eq!(hook.level(), HookLevel::Errors);
        hook.before_query("SELECT 1", &[]);
        hook.after_query("SELECT 1", Duration::from_millis(3), Ok(1));
    }
}
