//! Capability traits every backend adapter implements.
//!
//! A driver opens a [`RawHandle`] (the pooled connection set), then wraps it
//! into a [`QueryCapability`] bound to its SQL dialect. The manager only ever
//! talks to these traits, never to a concrete engine.

use crate::db::hook::QueryHook;
use crate::error::DbResult;
use crate::models::{Dialect, JsonRow, PoolStats, SqlParam};
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A live pool of connections to one backend.
#[async_trait]
pub trait RawHandle: Send + Sync + fmt::Debug {
    /// Round-trip to the server. Callers bound this with their own deadline.
    async fn ping(&self) -> DbResult<()>;

    fn stats(&self) -> PoolStats;

    /// Close every connection. Closing twice is not an error.
    async fn close(&self) -> DbResult<()>;

    fn is_closed(&self) -> bool;

    /// Access to the concrete pool type for the driver that created it.
    fn as_any(&self) -> &dyn Any;
}

/// Dialect-aware query access to a session's pool.
#[async_trait]
pub trait QueryCapability: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Attach an observer that sees every statement run through this capability
    /// and the transactions it begins.
    fn add_query_hook(&mut self, hook: Arc<dyn QueryHook>);

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64>;

    async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<JsonRow>>;

    async fn begin(&self) -> DbResult<Box<dyn Transaction>>;

    fn as_any(&self) -> &dyn Any;
}

/// An open transaction on a single pooled connection.
///
/// Dropping a transaction without calling [`commit`](Transaction::commit)
/// rolls it back.
#[async_trait]
pub trait Transaction: Send {
    /// Identifier used in log lines (`tx_<uuid>`).
    fn id(&self) -> &str;

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<u64>;

    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<JsonRow>>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;

    /// Typed access to the driver's transaction, e.g. a `sqlx::Transaction`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Generate a new transaction identifier.
pub fn new_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}
