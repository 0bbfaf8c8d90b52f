//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CAMPUS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `CAMPUS_HOST` - Bind address (default: 127.0.0.1)
//! - `CAMPUS_PORT` - Listen port (default: 3000)
//! - `CAMPUS_VERIFY_MAX_FAILURES` - Failed verifications allowed per window (default: 5)
//! - `CAMPUS_VERIFY_WINDOW_SECS` - Sliding window for failed verifications (default: 900)
//! - `CAMPUS_CORS_ORIGINS` - Comma-separated allowed browser origins (default: none)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Backing service configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Order verification rate limit
    pub verification: VerificationLimits,
    /// Browser origins allowed to call the API
    pub cors_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of error events sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions sent to Sentry
    pub sentry_traces_sample_rate: f32,
}

/// Failed-attempt limit for the order verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationLimits {
    /// Failures allowed inside one window before further attempts are refused
    pub max_failures: usize,
    /// Length of the sliding window
    pub window: chrono::Duration,
}

impl Default for VerificationLimits {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: chrono::Duration::minutes(15),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("CAMPUS_DATABASE_URL")?;
        let host = parse_env("CAMPUS_HOST", "127.0.0.1")?;
        let port = parse_env("CAMPUS_PORT", "3000")?;

        let max_failures = parse_env("CAMPUS_VERIFY_MAX_FAILURES", "5")?;
        if max_failures == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CAMPUS_VERIFY_MAX_FAILURES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let window_secs: i64 = parse_env("CAMPUS_VERIFY_WINDOW_SECS", "900")?;
        let window = chrono::Duration::try_seconds(window_secs)
            .filter(|w| *w > chrono::Duration::zero())
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "CAMPUS_VERIFY_WINDOW_SECS".to_string(),
                    "must be a positive number of seconds".to_string(),
                )
            })?;

        let cors_origins = get_optional_env("CAMPUS_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            host,
            port,
            verification: VerificationLimits {
                max_failures,
                window,
            },
            cors_origins,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, using `default` when it is unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
