//! Database layer.
//!
//! Drivers open raw handles, wrap them with a query capability and register
//! under a name in a [`DriverRegistry`]. The [`ConnectionManager`] owns the
//! resulting named [`Session`]s together with the optional cache client.

#[macro_use]
pub mod macros;
pub mod capability;
pub mod driver;
pub mod drivers;
pub mod hook;
pub mod manager;
pub mod params;
pub mod pool;
pub mod query;
pub mod session;
pub mod types;

pub use capability::{QueryCapability, RawHandle, Transaction};
pub use driver::{Driver, DriverRegistry};
pub use drivers::{MssqlDriver, MySqlDriver, PostgresDriver, SqliteDriver};
pub use hook::{HookLevel, QueryHook, QueryHooks, TracingQueryHook};
pub use manager::{CACHE_KEY, ConnectionManager, SESSION_PING_TIMEOUT};
pub use pool::DbPool;
pub use query::{SqlxQuery, SqlxTransaction};
pub use session::Session;
