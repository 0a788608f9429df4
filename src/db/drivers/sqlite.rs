//! SQLite adapter.

use crate::db::capability::{QueryCapability, RawHandle};
use crate::db::driver::{Driver, DriverRegistry};
use crate::db::pool::{DbPool, apply_tuning, connection_error};
use crate::error::DbResult;
use crate::models::{Dialect, PoolTuning};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

pub const NAME: &str = "sqlite";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        NAME
    }

    /// Use `?mode=rwc` in the connection string to create a missing file.
    async fn open(
        &self,
        connection_string: &str,
        tuning: &PoolTuning,
    ) -> DbResult<Arc<dyn RawHandle>> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| connection_error(Dialect::Sqlite, e))?;
        let pool = apply_tuning(SqlitePoolOptions::new(), tuning).connect_lazy_with(options);
        Ok(Arc::new(DbPool::SQLite(pool)))
    }

    fn wrap_for_querying(&self, raw: Arc<dyn RawHandle>) -> DbResult<Box<dyn QueryCapability>> {
        super::wrap_sqlx_pool(raw, Dialect::Sqlite, NAME)
    }
}

pub fn register(registry: &mut DriverRegistry) {
    registry.register(NAME, Arc::new(SqliteDriver));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SqlParam;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_database_round_trip() {
        let tuning = PoolTuning {
            max_open: Some(1),
            ..PoolTuning::default()
        };
        let raw = SqliteDriver.open("sqlite::memory:", &tuning).await.unwrap();
        raw.ping().await.unwrap();
        let query = SqliteDriver.wrap_for_querying(raw.clone()).unwrap();

        query
            .execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, data BLOB)", &[])
            .await
            .unwrap();
        let inserted = query
            .execute(
                "INSERT INTO items (name, data) VALUES (?, ?)",
                &[SqlParam::from("widget"), SqlParam::Bytes(b"hi".to_vec())],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = query
            .fetch_all("SELECT id, name, data FROM items WHERE name = ?", &["widget".into()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("widget"));
        assert_eq!(rows[0]["data"], json!("aGk="));

        raw.close().await.unwrap();
    }
}
