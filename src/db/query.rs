//! Query capability and transactions for the sqlx backends.

use crate::db::capability::{QueryCapability, Transaction, new_transaction_id};
use crate::db::hook::{QueryHook, QueryHooks};
use crate::db::params::{mysql_query, postgres_query, sqlite_query};
use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{Dialect, JsonRow, SqlParam};
use async_trait::async_trait;
use sqlx::{MySql, Postgres, Sqlite};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Query access to a [`DbPool`].
#[derive(Debug, Clone)]
pub struct SqlxQuery {
    pool: DbPool,
    hooks: QueryHooks,
}

impl SqlxQuery {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            hooks: QueryHooks::default(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    async fn run_execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let affected = impl_db_dispatch!(&self.pool, {
            MySql(p) => mysql_query(sql, params).execute(p).await?.rows_affected(),
            Postgres(p) => postgres_query(sql, params).execute(p).await?.rows_affected(),
            SQLite(p) => sqlite_query(sql, params).execute(p).await?.rows_affected(),
        });
        Ok(affected)
    }

    async fn run_fetch_all(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<JsonRow>> {
        let rows = impl_db_dispatch!(&self.pool, {
            MySql(p) => mysql_query(sql, params).fetch_all(p).await?.iter().map(RowToJson::to_json_map).collect(),
            Postgres(p) => postgres_query(sql, params).fetch_all(p).await?.iter().map(RowToJson::to_json_map).collect(),
            SQLite(p) => sqlite_query(sql, params).fetch_all(p).await?.iter().map(RowToJson::to_json_map).collect(),
        });
        Ok(rows)
    }
}

#[async_trait]
impl QueryCapability for SqlxQuery {
    fn dialect(&self) -> Dialect {
        self.pool.dialect()
    }

    fn add_query_hook(&mut self, hook: Arc<dyn QueryHook>) {
        self.hooks.push(hook);
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let started = self.hooks.start(sql, params);
        let result = self.run_execute(sql, params).await;
        self.hooks.finish(sql, started, result.as_ref().copied());
        result
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<JsonRow>> {
        let started = self.hooks.start(sql, params);
        let result = self.run_fetch_all(sql, params).await;
        self.hooks
            .finish(sql, started, result.as_ref().map(|rows| rows.len() as u64));
        result
    }

    async fn begin(&self) -> DbResult<Box<dyn Transaction>> {
        let inner = impl_db_dispatch!(&self.pool, {
            MySql(p) => DbTransaction::MySql(p.begin().await?),
            Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        });
        let id = new_transaction_id();
        debug!(transaction_id = %id, dialect = %self.dialect(), "Transaction started");
        Ok(Box::new(SqlxTransaction {
            id,
            inner,
            hooks: self.hooks.clone(),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(sqlx::Transaction<'static, MySql>),
    Postgres(sqlx::Transaction<'static, Postgres>),
    SQLite(sqlx::Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbTransaction::MySql(_) => Dialect::MySql,
            DbTransaction::Postgres(_) => Dialect::Postgres,
            DbTransaction::SQLite(_) => Dialect::Sqlite,
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let result = match self {
            DbTransaction::MySql(tx) => mysql_query(sql, params)
                .execute(&mut **tx)
                .await?
                .rows_affected(),
            DbTransaction::Postgres(tx) => postgres_query(sql, params)
                .execute(&mut **tx)
                .await?
                .rows_affected(),
            DbTransaction::SQLite(tx) => sqlite_query(sql, params)
                .execute(&mut **tx)
                .await?
                .rows_affected(),
        };
        Ok(result)
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<JsonRow>> {
        let rows = match self {
            DbTransaction::MySql(tx) => mysql_query(sql, params)
                .fetch_all(&mut **tx)
                .await?
                .iter()
                .map(RowToJson::to_json_map)
                .collect(),
            DbTransaction::Postgres(tx) => postgres_query(sql, params)
                .fetch_all(&mut **tx)
                .await?
                .iter()
                .map(RowToJson::to_json_map)
                .collect(),
            DbTransaction::SQLite(tx) => sqlite_query(sql, params)
                .fetch_all(&mut **tx)
                .await?
                .iter()
                .map(RowToJson::to_json_map)
                .collect(),
        };
        Ok(rows)
    }
}

/// A transaction begun through [`SqlxQuery::begin`].
pub struct SqlxTransaction {
    id: String,
    inner: DbTransaction,
    hooks: QueryHooks,
}

impl SqlxTransaction {
    pub fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    pub fn as_postgres(&mut self) -> Option<&mut sqlx::Transaction<'static, Postgres>> {
        match &mut self.inner {
            DbTransaction::Postgres(tx) => Some(tx),
            _ => None,
        }
    }

    pub fn as_mysql(&mut self) -> Option<&mut sqlx::Transaction<'static, MySql>> {
        match &mut self.inner {
            DbTransaction::MySql(tx) => Some(tx),
            _ => None,
        }
    }

    pub fn as_sqlite(&mut self) -> Option<&mut sqlx::Transaction<'static, Sqlite>> {
        match &mut self.inner {
            DbTransaction::SQLite(tx) => Some(tx),
            _ => None,
        }
    }
}

#[async_trait]
impl Transaction for SqlxTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let started = self.hooks.start(sql, params);
        let result = self.inner.execute(sql, params).await;
        self.hooks.finish(sql, started, result.as_ref().copied());
        result
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<JsonRow>> {
        let started = self.hooks.start(sql, params);
        let result = self.inner.fetch_all(sql, params).await;
        self.hooks
            .finish(sql, started, result.as_ref().map(|rows| rows.len() as u64));
        result
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let id = self.id;
        match self.inner {
            DbTransaction::MySql(tx) => tx.commit().await,
            DbTransaction::Postgres(tx) => tx.commit().await,
            DbTransaction::SQLite(tx) => tx.commit().await,
        }
        .map_err(|e| DbError::transaction(&id, format!("commit failed: {}", e)))?;
        debug!(transaction_id = %id, "Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        let id = self.id;
        match self.inner {
            DbTransaction::MySql(tx) => tx.rollback().await,
            DbTransaction::Postgres(tx) => tx.rollback().await,
            DbTransaction::SQLite(tx) => tx.rollback().await,
        }
        .map_err(|e| DbError::transaction(&id, format!("rollback failed: {}", e)))?;
        debug!(transaction_id = %id, "Transaction rolled back");
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
