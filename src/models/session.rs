//! Session configuration models.
//!
//! A [`SessionConfig`] describes one named connection pool. It is supplied by the
//! caller, copied into the resulting session and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SQL dialect bound by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    /// Includes MariaDB
    MySql,
    Sqlite,
    Mssql,
}

impl Dialect {
    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
            Self::Mssql => "SQL Server",
        }
    }

    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::MySql | Self::Sqlite => "?".to_string(),
            Self::Mssql => format!("@P{}", index),
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Self::Postgres | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Mssql => format!("[{}]", ident.replace(']', "]]")),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Configuration for one named session.
///
/// Pool fields left at zero keep the driver's default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique key in the session table.
    pub name: String,
    /// Passed verbatim to the driver. Contains sensitive data - never log.
    #[serde(skip_serializing)]
    pub connection_string: String,
    /// Registry key of the driver that opens this session.
    pub driver: String,
    #[serde(default)]
    pub max_open_conns: u32,
    #[serde(default)]
    pub max_idle_conns: u32,
    #[serde(default)]
    pub conn_max_lifetime: Duration,
    #[serde(default)]
    pub conn_max_idle_time: Duration,
    /// Attach the verbose query logging hook.
    #[serde(default)]
    pub debug: bool,
}

impl SessionConfig {
    pub fn new(
        name: impl Into<String>,
        driver: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
            driver: driver.into(),
            max_open_conns: 0,
            max_idle_conns: 0,
            conn_max_lifetime: Duration::ZERO,
            conn_max_idle_time: Duration::ZERO,
            debug: false,
        }
    }

    pub fn with_max_open_conns(mut self, max_open_conns: u32) -> Self {
        self.max_open_conns = max_open_conns;
        self
    }

    pub fn with_max_idle_conns(mut self, max_idle_conns: u32) -> Self {
        self.max_idle_conns = max_idle_conns;
        self
    }

    pub fn with_conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    pub fn with_conn_max_idle_time(mut self, idle_time: Duration) -> Self {
        self.conn_max_idle_time = idle_time;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Check the fields the manager relies on. The connection string is not inspected.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.name.is_empty() {
            return Err(SessionConfigError::EmptyName);
        }
        if self.driver.is_empty() {
            return Err(SessionConfigError::EmptyDriver(self.name.clone()));
        }
        Ok(())
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        mask_password(&self.connection_string)
    }
}

/// Replace the password part of a URL-style or ADO-style connection string.
pub fn mask_password(connection_string: &str) -> String {
    if let Some(scheme_end) = connection_string.find("://").map(|p| p + 3) {
        let rest = &connection_string[scheme_end..];
        let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        // The last '@' ends the userinfo; the password itself may contain '@'
        if let Some(at) = rest[..authority_len].rfind('@') {
            if let Some(colon) = rest[..at].find(':') {
                let prefix = &connection_string[..scheme_end + colon + 1];
                let suffix = &connection_string[scheme_end + at..];
                return format!("{}****{}", prefix, suffix);
            }
        }
    }

    // ADO style: "server=...;password=secret;..."
    connection_string
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, _))
                if key.trim().eq_ignore_ascii_case("password")
                    || key.trim().eq_ignore_ascii_case("pwd") =>
            {
                format!("{}=****", key)
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Errors that can occur when validating a session configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionConfigError {
    #[error("Session name cannot be empty")]
    EmptyName,

    #[error("Session '{0}' has no driver name")]
    EmptyDriver(String),
}

/// The positive subset of a config's pool fields.
///
/// `None` means "leave the driver's default"; a zero in the config never turns
/// into a zero-sized pool or a zero lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolTuning {
    pub max_open: Option<u32>,
    pub max_idle: Option<u32>,
    pub max_lifetime: Option<Duration>,
    pub max_idle_time: Option<Duration>,
}

impl PoolTuning {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_open: positive(config.max_open_conns),
            max_idle: positive(config.max_idle_conns),
            max_lifetime: positive_duration(config.conn_max_lifetime),
            max_idle_time: positive_duration(config.conn_max_idle_time),
        }
    }

    /// True when every field keeps the driver default.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

fn positive(value: u32) -> Option<u32> {
    (value > 0).then_some(value)
}

fn positive_duration(value: Duration) -> Option<Duration> {
    (!value.is_zero()).then_some(value)
}
