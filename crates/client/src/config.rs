//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CAMPUS_API_URL` - Base URL of the campus backing service
//!
//! ## Optional
//! - `CAMPUS_API_KEY` - Anonymous API key sent as the `apikey` header
//! - `CAMPUS_REQUEST_TIMEOUT_SECS` - Per-request HTTP timeout (default: 15)
//! - `CAMPUS_PROFILE_TIMEOUT_SECS` - Profile fetch upper bound (default: 10)
//! - `CAMPUS_PROFILE_CACHE_TTL_SECS` - Resolved profile lifetime (default: 300)
//! - `CAMPUS_SERVICE_FEE_RATE` - Service fee as a fraction of the cart subtotal (default: 0.05)
//! - `CAMPUS_PICKUP_WINDOW_MINUTES` - Order pickup deadline offset (default: 30)
//! - `CAMPUS_RESET_LINK_WINDOW_SECS` - Password reset link lifetime after first open (default: 60)

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backing service
    pub api_url: Url,
    /// Anonymous API key, if the service requires one
    pub api_key: Option<SecretString>,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Upper bound on a single profile fetch
    pub profile_timeout: Duration,
    /// How long a resolved profile is reused before it is fetched again
    pub profile_cache_ttl: Duration,
    /// Service fee as a fraction of the cart subtotal
    pub service_fee_rate: Decimal,
    /// Pickup deadline offset from order creation
    pub pickup_window: chrono::Duration,
    /// Reset link lifetime measured from its first open
    pub reset_link_window: chrono::Duration,
}

impl ClientConfig {
    /// Default profile fetch timeout.
    pub const DEFAULT_PROFILE_TIMEOUT: Duration = Duration::from_secs(10);

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

        let api_url = get_required_env("CAMPUS_API_URL")?;
        let api_url = Url::parse(&api_url)
            .map_err(|e| ConfigError::InvalidEnvVar("CAMPUS_API_URL".to_string(), e.to_string()))?;

        Ok(Self {
            api_url,
            api_key: get_optional_env("CAMPUS_API_KEY").map(SecretString::from),
            request_timeout: Duration::from_secs(parse_env_or("CAMPUS_REQUEST_TIMEOUT_SECS", 15)?),
            profile_timeout: Duration::from_secs(parse_env_or("CAMPUS_PROFILE_TIMEOUT_SECS", 10)?),
            profile_cache_ttl: Duration::from_secs(parse_env_or(
                "CAMPUS_PROFILE_CACHE_TTL_SECS",
                300,
            )?),
            service_fee_rate: parse_env_or("CAMPUS_SERVICE_FEE_RATE", Decimal::new(5, 2))?,
            pickup_window: chrono::Duration::minutes(parse_env_or(
                "CAMPUS_PICKUP_WINDOW_MINUTES",
                30,
            )?),
            reset_link_window: chrono::Duration::seconds(parse_env_or(
                "CAMPUS_RESET_LINK_WINDOW_SECS",
                60,
            )?),
        })
    }

    /// Configuration with defaults for everything but the service URL.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            api_key: None,
            request_timeout: Duration::from_secs(15),
            profile_timeout: Self::DEFAULT_PROFILE_TIMEOUT,
            profile_cache_ttl: Duration::from_secs(300),
            service_fee_rate: Decimal::new(5, 2),
            pickup_window: chrono::Duration::minutes(30),
            reset_link_window: chrono::Duration::seconds(60),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable, falling back to a default when unset.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new(Url::parse("http://localhost:3000").unwrap());
        assert_eq!(config.profile_timeout, Duration::from_secs(10));
        assert_eq!(config.service_fee_rate, Decimal::new(5, 2));
        assert_eq!(config.pickup_window, chrono::Duration::minutes(30));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_parse_env_or_uses_default_when_unset() {
        let value: u64 = parse_env_or("CAMPUS_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let mut config = ClientConfig::new(Url::parse("http://localhost:3000").unwrap());
        config.api_key = Some(SecretString::from("anon-key-value"));
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("anon-key-value"));
    }
}
