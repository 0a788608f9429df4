//! Built-in backend adapters.
//!
//! Each adapter module exposes a `register` function; [`register_builtin`]
//! calls all of them.

pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mssql::MssqlDriver;
pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use crate::db::capability::{QueryCapability, RawHandle};
use crate::db::driver::DriverRegistry;
use crate::db::pool::DbPool;
use crate::db::query::SqlxQuery;
use crate::error::{DbError, DbResult};
use crate::models::Dialect;
use std::sync::Arc;

/// Register the PostgreSQL, MySQL, SQLite and SQL Server adapters.
pub fn register_builtin(registry: &mut DriverRegistry) {
    postgres::register(registry);
    mysql::register(registry);
    sqlite::register(registry);
    mssql::register(registry);
}

/// Wrap a sqlx pool opened by the driver named `driver`.
fn wrap_sqlx_pool(
    raw: Arc<dyn RawHandle>,
    dialect: Dialect,
    driver: &str,
) -> DbResult<Box<dyn QueryCapability>> {
    let pool = raw
        .as_any()
        .downcast_ref::<DbPool>()
        .filter(|pool| pool.dialect() == dialect)
        .ok_or_else(|| {
            DbError::invalid_input(format!("handle was not opened by the '{}' driver", driver))
        })?;
    Ok(Box::new(SqlxQuery::new(pool.clone())))
}
