//! Error types for nest-db.
//!
//! All manager operations return [`DbError`]. Lower-level failures from the wire
//! drivers are converted into the same enum and, where a session or config is
//! involved, wrapped with its name so the failing backend and phase are visible
//! in the message.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("driver '{driver}' not found")]
    DriverNotFound { driver: String },

    #[error("session '{name}' not found")]
    SessionNotFound { name: String },

    #[error("session '{name}' already exists")]
    SessionExists { name: String },

    #[error("no database connection available")]
    NoConnectionAvailable,

    #[error("failed to create session '{name}': {source}")]
    SessionInit {
        name: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("failed to open database with driver '{driver}': {source}")]
    Open {
        driver: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("failed to ping '{name}': {source}")]
    Ping {
        name: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("failed to close '{name}': {source}")]
    Close {
        name: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Transaction error on session '{session}': {message}")]
    Transaction { session: String, message: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn driver_not_found(driver: impl Into<String>) -> Self {
        Self::DriverNotFound {
            driver: driver.into(),
        }
    }

    pub fn session_not_found(name: impl Into<String>) -> Self {
        Self::SessionNotFound { name: name.into() }
    }

    pub fn session_exists(name: impl Into<String>) -> Self {
        Self::SessionExists { name: name.into() }
    }

    /// Wrap a failure of `create_session` with the config name.
    pub fn session_init(name: impl Into<String>, source: DbError) -> Self {
        Self::SessionInit {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn open(driver: impl Into<String>, source: DbError) -> Self {
        Self::Open {
            driver: driver.into(),
            source: Box::new(source),
        }
    }

    pub fn ping(name: impl Into<String>, source: DbError) -> Self {
        Self::Ping {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn close(name: impl Into<String>, source: DbError) -> Self {
        Self::Close {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn transaction(session: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transaction {
            session: session.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for an operation bounded by `limit`.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms: limit.as_millis() as u64,
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, looking through wrappers.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::DriverNotFound { .. } => {
                Some("Register the driver before calling init, or check the driver name")
            }
            Self::SessionInit { source, .. }
            | Self::Open { source, .. }
            | Self::Ping { source, .. }
            | Self::Close { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::Cache { .. } => true,
            Self::SessionInit { source, .. }
            | Self::Open { source, .. }
            | Self::Ping { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a pooled connection",
                "Check that the server is reachable or raise max_open_conns",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Re-initialise the session")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => DbError::database(
                token.message().to_string(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            err @ tiberius::error::Error::Io { .. } => DbError::connection(
                err.to_string(),
                "Check network connectivity and SQL Server status",
            ),
            err @ tiberius::error::Error::Tls(_) => DbError::connection(
                err.to_string(),
                "Verify TLS settings, e.g. TrustServerCertificate=true for self-signed servers",
            ),
            err @ tiberius::error::Error::Routing { .. } => DbError::connection(
                err.to_string(),
                "Connect to the routed host directly",
            ),
            err => DbError::internal(format!("SQL Server error: {}", err)),
        }
    }
}

impl From<redis::RedisError> for DbError {
    fn from(err: redis::RedisError) -> Self {
        DbError::cache(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for DbError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        DbError::cache(format!("pool error: {}", err))
    }
}

impl From<deadpool_redis::CreatePoolError> for DbError {
    fn from(err: deadpool_redis::CreatePoolError) -> Self {
        DbError::cache(format!("failed to create pool: {}", err))
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Every failure collected while closing sessions and the cache.
///
/// `close_all` keeps going after a failed close, so a single value can carry
/// several causes. Each entry keeps the resource name next to its error.
#[derive(Debug, Default)]
pub struct CloseErrors {
    failures: Vec<(String, DbError)>,
}

impl CloseErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, error: DbError) {
        self.failures.push((name.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[(String, DbError)] {
        &self.failures
    }

    /// Names of the resources that failed to close.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for CloseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errors occurred while closing connections: [")?;
        for (idx, (name, err)) in self.failures.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", name, err)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for CloseErrors {}
