//! Server configuration read from the environment.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Runtime configuration of the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// PostgreSQL connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Bind host (`HOST`).
    pub host: String,
    /// Bind port (`PORT`).
    pub port: u16,
    /// Pool size (`DB_MAX_CONNECTIONS`).
    pub db_max_connections: u32,
    /// Broker connection string (`REDIS_URL`).
    pub redis_url: String,
    /// Snapshot threshold (`SNAPSHOT_EVERY`).
    pub snapshot_every: i64,
    /// Outbox polling interval (`OUTBOX_POLL_INTERVAL_MS`).
    pub outbox_poll_interval: Duration,
    /// Outbox messages per cycle (`OUTBOX_BATCH_SIZE`).
    pub outbox_batch_size: i64,
    /// Per-request deadline (`REQUEST_TIMEOUT_MS`).
    pub request_timeout: Duration,
    /// Grace period for draining on shutdown (`SHUTDOWN_TIMEOUT_SECS`).
    pub shutdown_timeout: Duration,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any value
    /// cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".into())
        })?;

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 3000)?,
            db_max_connections: positive(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            snapshot_every: positive(&lookup, "SNAPSHOT_EVERY", 50)?,
            outbox_poll_interval: Duration::from_millis(positive(
                &lookup,
                "OUTBOX_POLL_INTERVAL_MS",
                500,
            )?),
            outbox_batch_size: positive(&lookup, "OUTBOX_BATCH_SIZE", 50)?,
            request_timeout: Duration::from_millis(positive(&lookup, "REQUEST_TIMEOUT_MS", 5000)?),
            shutdown_timeout: Duration::from_secs(positive(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?),
        })
    }

    /// The socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn bind_address(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: Display,
{
    let value = parsed(lookup, key, default)?;
    if value <= T::default() {
        return Err(AppError::Config(format!("{key} must be greater than zero")));
    }
    Ok(value)
}
