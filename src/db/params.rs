//! Parameter binding for the sqlx backends.

use crate::models::SqlParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

pub(crate) type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;
pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;
pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(query: MySqlQuery<'q>, param: &'q SqlParam) -> MySqlQuery<'q> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(query: PgQuery<'q>, param: &'q SqlParam) -> PgQuery<'q> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(query: SqliteQuery<'q>, param: &'q SqlParam) -> SqliteQuery<'q> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

pub(crate) fn mysql_query<'q>(sql: &'q str, params: &'q [SqlParam]) -> MySqlQuery<'q> {
    params.iter().fold(sqlx::query(sql), bind_mysql_param)
}

pub(crate) fn postgres_query<'q>(sql: &'q str, params: &'q [SqlParam]) -> PgQuery<'q> {
    params.iter().fold(sqlx::query(sql), bind_postgres_param)
}

pub(crate) fn sqlite_query<'q>(sql: &'q str, params: &'q [SqlParam]) -> SqliteQuery<'q> {
    params.iter().fold(sqlx::query(sql), bind_sqlite_param)
}
