//! Profile repository.
//!
//! Queries use runtime `sqlx::query_as` with `FromRow` so the crate builds
//! without a live database.

use sqlx::PgPool;
use tracing::instrument;

use campus_core::{NewProfile, Profile, ProfileChanges, ProfileId, SubjectId};

use super::RepositoryError;

const PROFILE_COLUMNS: &str = "id, subject_id, full_name, email, phone_number, department, \
     academic_year, hall_ticket, profile_picture_url, is_active, email_verified";

/// Repository for `users` rows.
pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    /// Create a new profile repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the profile belonging to an identity provider subject.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(subject = %subject))]
    pub async fn get_by_subject(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<Profile>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM users WHERE subject_id = $1");
        sqlx::query_as::<_, Profile>(&sql)
            .bind(subject)
            .fetch_optional(self.pool)
            .await
            .map_err(RepositoryError::from_write)
    }

    /// Insert a new profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the subject, email or hall
    /// ticket is already registered.
    #[instrument(skip(self, profile), fields(subject = %profile.subject_id))]
    pub async fn create(&self, profile: &NewProfile) -> Result<Profile, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (subject_id, full_name, email, phone_number, department, \
             academic_year, hall_ticket, profile_picture_url, email_verified) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PROFILE_COLUMNS}"
        );
        sqlx::query_as::<_, Profile>(&sql)
            .bind(&profile.subject_id)
            .bind(profile.full_name.trim())
            .bind(&profile.email)
            .bind(profile.phone_number.trim())
            .bind(profile.department.trim())
            .bind(profile.academic_year.trim())
            .bind(profile.hall_ticket.as_str())
            .bind(profile.profile_picture_url.as_deref())
            .bind(profile.email_verified)
            .fetch_one(self.pool)
            .await
            .map_err(RepositoryError::from_write)
    }

    /// Apply a partial update. Absent fields keep their value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no profile has this id.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: ProfileId,
        changes: &ProfileChanges,
    ) -> Result<Profile, RepositoryError> {
        let sql = format!(
            "UPDATE users SET \
                 full_name = COALESCE($2, full_name), \
                 phone_number = COALESCE($3, phone_number), \
                 department = COALESCE($4, department), \
                 academic_year = COALESCE($5, academic_year), \
                 profile_picture_url = COALESCE($6, profile_picture_url), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        );
        sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(changes.full_name.as_deref().map(str::trim))
            .bind(changes.phone_number.as_deref().map(str::trim))
            .bind(changes.department.as_deref().map(str::trim))
            .bind(changes.academic_year.as_deref().map(str::trim))
            .bind(changes.profile_picture_url.as_deref())
            .fetch_optional(self.pool)
            .await
            .map_err(RepositoryError::from_write)?
            .ok_or(RepositoryError::NotFound)
    }

    /// `check_hall_ticket_exists` database function.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn hall_ticket_exists(&self, hall_ticket: &str) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar("SELECT check_hall_ticket_exists($1)")
            .bind(hall_ticket)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }

    /// `check_email_exists` database function.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar("SELECT check_email_exists($1)")
            .bind(email)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }
}
