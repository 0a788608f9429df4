//! Dispatch macro over the sqlx pool variants.

/// Generate match arms for every `DbPool` variant.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => p.close().await,
///     Postgres(p) => p.close().await,
///     SQLite(p) => p.close().await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;

#[cfg(test)]
mod tests {
    use crate::db::pool::DbPool;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_dispatch_selects_variant() {
        let pool = DbPool::SQLite(SqlitePoolOptions::new().connect_lazy("sqlite::memory:").unwrap());
        let name = impl_db_dispatch!(&pool, {
            MySql(_p) => "mysql",
            Postgres(_p) => "postgres",
            SQLite(_p) => "sqlite",
        });
        assert_eq!(name, "sqlite");
    }
}
