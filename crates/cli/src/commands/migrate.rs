//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! campus-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CAMPUS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! Migrations live in `crates/server/migrations/` and are embedded at build time.

use secrecy::ExposeSecret;
use sqlx::PgPool;

use super::{CommandError, database_url};

/// Run all pending migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to campus database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
