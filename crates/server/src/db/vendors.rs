//! Vendor repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use campus_core::VendorId;

use super::RepositoryError;

/// A campus food vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository for `vendors` rows.
pub struct VendorRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VendorRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a vendor.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a vendor with this name exists.
    pub async fn create(
        &self,
        name: &str,
        location: Option<&str>,
    ) -> Result<Vendor, RepositoryError> {
        sqlx::query_as::<_, Vendor>(
            "INSERT INTO vendors (name, location) VALUES ($1, $2) \
             RETURNING id, name, location, is_active, created_at",
        )
        .bind(name.trim())
        .bind(location)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)
    }

    /// All vendors, by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Vendor>, RepositoryError> {
        let vendors = sqlx::query_as::<_, Vendor>(
            "SELECT id, name, location, is_active, created_at FROM vendors ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(vendors)
    }
}
