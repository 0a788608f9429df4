//! MySQL and MariaDB adapter.

use crate::db::capability::{QueryCapability, RawHandle};
use crate::db::driver::{Driver, DriverRegistry};
use crate::db::pool::{DbPool, apply_tuning, connection_error};
use crate::error::DbResult;
use crate::models::{Dialect, PoolTuning};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

pub const NAME: &str = "mysql";

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &str {
        NAME
    }

    async fn open(
        &self,
        connection_string: &str,
        tuning: &PoolTuning,
    ) -> DbResult<Arc<dyn RawHandle>> {
        let mut options = MySqlConnectOptions::from_str(connection_string)
            .map_err(|e| connection_error(Dialect::MySql, e))?;
        if !sets_charset(connection_string) {
            options = options.charset("utf8mb4");
        }
        let pool = apply_tuning(MySqlPoolOptions::new(), tuning).connect_lazy_with(options);
        Ok(Arc::new(DbPool::MySql(pool)))
    }

    fn wrap_for_querying(&self, raw: Arc<dyn RawHandle>) -> DbResult<Box<dyn QueryCapability>> {
        super::wrap_sqlx_pool(raw, Dialect::MySql, NAME)
    }
}

/// True when the connection string picks its own charset.
fn sets_charset(connection_string: &str) -> bool {
    Url::parse(connection_string)
        .map(|url| url.query_pairs().any(|(key, _)| key.eq_ignore_ascii_case("charset")))
        .unwrap_or(false)
}

pub fn register(registry: &mut DriverRegistry) {
    registry.register(NAME, Arc::new(MySqlDriver));
}
