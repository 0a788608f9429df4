//! PostgreSQL adapter.

use crate::db::capability::{QueryCapability, RawHandle};
use crate::db::driver::{Driver, DriverRegistry};
use crate::db::pool::{DbPool, apply_tuning, connection_error};
use crate::error::DbResult;
use crate::models::{Dialect, PoolTuning};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;

pub const NAME: &str = "postgres";

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        NAME
    }

    async fn open(
        &self,
        connection_string: &str,
        tuning: &PoolTuning,
    ) -> DbResult<Arc<dyn RawHandle>> {
        let options = PgConnectOptions::from_str(connection_string)
            .map_err(|e| connection_error(Dialect::Postgres, e))?;
        let pool = apply_tuning(PgPoolOptions::new(), tuning).connect_lazy_with(options);
        Ok(Arc::new(DbPool::Postgres(pool)))
    }

    fn wrap_for_querying(&self, raw: Arc<dyn RawHandle>) -> DbResult<Box<dyn QueryCapability>> {
        super::wrap_sqlx_pool(raw, Dialect::Postgres, NAME)
    }
}

pub fn register(registry: &mut DriverRegistry) {
    registry.register(NAME, Arc::new(PostgresDriver));
}
