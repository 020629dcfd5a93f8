//! Environment-driven server configuration.

use std::net::SocketAddr;

use thiserror::Error;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value}")]
    InvalidBindAddr { var: &'static str, value: String },
    #[error("{var} must be a positive integer, got {value}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Server configuration.
///
/// - `PARCELMARK_BIND`: listen address (default `0.0.0.0:8080`)
/// - `DATABASE_URL`: Postgres connection string; in-memory stores are used when unset
/// - `PARCELMARK_DB_MAX_CONNECTIONS`: pool size (default 5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = non_empty("PARCELMARK_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind.parse::<SocketAddr>().map_err(|_| ConfigError::InvalidBindAddr {
            var: "PARCELMARK_BIND",
            value: bind.clone(),
        })?;

        let db_max_connections = match non_empty("PARCELMARK_DB_MAX_CONNECTIONS") {
            None => DEFAULT_DB_MAX_CONNECTIONS,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    var: "PARCELMARK_DB_MAX_CONNECTIONS",
                    value: raw,
                })?,
        };

        Ok(Self {
            bind_addr,
            database_url: non_empty("DATABASE_URL"),
            db_max_connections,
        })
    }
}
