// src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::utils::retry::RetryPolicy;

/// Upper bound on the seat capacity of a single ride or ride request.
pub const MAX_SEATS_PER_LISTING: i32 = 8;

/// Upper bound on a single wallet credit or debit.
pub const MAX_WALLET_AMOUNT: i64 = 100_000;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Hard cap on page size for list endpoints.
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} is not a valid value: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` runs on the in-memory store.
    pub database_url: Option<String>,
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub store_timeout: Duration,
    pub store_retry_attempts: usize,
    pub store_retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            port: parse_var("PORT", 3000)?,
            cors_origins,
            store_timeout: Duration::from_millis(parse_var("STORE_TIMEOUT_MS", 3000)?),
            store_retry_attempts: parse_var("STORE_RETRY_ATTEMPTS", 3)?,
            store_retry_backoff: Duration::from_millis(parse_var("STORE_RETRY_BACKOFF_MS", 50)?),
        })
    }

    /// Retry policy applied to every store call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.store_retry_attempts,
            initial_delay: self.store_retry_backoff,
            attempt_timeout: self.store_timeout,
            ..RetryPolicy::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}
