//! Data models shared by the manager, the drivers and the binary.

pub mod cache;
pub mod query;
pub mod session;
pub mod stats;

pub use cache::CacheConfig;
pub use query::{JsonRow, SqlParam};
pub use session::{Dialect, PoolTuning, SessionConfig, SessionConfigError, mask_password};
pub use stats::{CacheStats, ConnectionStats, PoolStats};
