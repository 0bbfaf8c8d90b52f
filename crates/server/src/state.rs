//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::services::VerificationService;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The verification service lives here so its
/// failure counters are shared by every request.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    verification: VerificationService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ServerConfig, pool: PgPool) -> Self {
        let verification = VerificationService::new(config.verification);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                verification,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the verification service.
    #[must_use]
    pub fn verification(&self) -> &VerificationService {
        &self.inner.verification
    }
}
