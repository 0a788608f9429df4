//! nest-db
//!
//! Named database sessions over PostgreSQL, MySQL, SQLite and SQL Server, opened
//! through a pluggable driver registry and held by one [`ConnectionManager`]
//! alongside an optional Redis cache client.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use cache::CacheClient;
pub use config::Config;
pub use db::{ConnectionManager, Driver, DriverRegistry, QueryCapability, Session, Transaction};
pub use error::{CloseErrors, DbError, DbResult};
pub use models::{CacheConfig, SessionConfig};
