//! Database operations for the campus `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Student profiles keyed by identity provider subject
//! - `vendors` - Campus food vendors
//! - `products` - Vendor menu items
//! - `campus_orders` - One row per vendor per checkout
//! - `campus_order_items` - Lines of an order, written after the order row
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p campus-cli -- migrate
//! ```

pub mod orders;
pub mod profiles;
pub mod vendors;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use orders::OrderRepository;
pub use profiles::ProfileRepository;
pub use vendors::{Vendor, VendorRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and foreign key violations to `Conflict`, everything else to `Database`.
    pub(crate) fn from_write(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                return Self::Conflict(format!("{constraint} already exists"));
            }
            if db_err.is_foreign_key_violation() {
                let constraint = db_err.constraint().unwrap_or("foreign key");
                return Self::Conflict(format!("{constraint} references a missing row"));
            }
        }
        if let sqlx::Error::ColumnDecode { ref source, .. } = e {
            return Self::DataCorruption(source.to_string());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
