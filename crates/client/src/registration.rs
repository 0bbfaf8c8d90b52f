//! Profile registration and edits.
//!
//! The existence checks run before the insert only to give a clear message
//! early; uniqueness is enforced by the store, and a conflict on insert is
//! reported as [`RegistrationError::AlreadyRegistered`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use campus_core::{Email, EmailError, HallTicket, HallTicketError, NewProfile, Profile, ProfileChanges};

use crate::backend::{BackendError, IdentityProvider, ProfileDirectory};
use crate::profile::{ProfileError, ProfileResolver};

/// Registration form contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub department: String,
    pub academic_year: String,
    pub hall_ticket: String,
    pub profile_picture_url: Option<String>,
}

/// Errors from registering or editing a profile.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("please sign in first")]
    NoSession,

    #[error("no profile to update - please complete registration")]
    ProfileMissing,

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("invalid hall ticket: {0}")]
    InvalidHallTicket(#[from] HallTicketError),

    #[error("Hall ticket is already registered")]
    HallTicketTaken,

    #[error("Email is already registered")]
    EmailTaken,

    /// The store refused the insert on a uniqueness constraint.
    #[error("a profile with these details is already registered")]
    AlreadyRegistered,

    /// An existence check could not be completed.
    #[error("Failed to validate {what}")]
    ValidationUnavailable {
        what: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("failed to save profile: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// Creates and edits the signed-in user's profile.
pub struct ProfileRegistrar<D, P> {
    directory: Arc<D>,
    resolver: ProfileResolver<D, P>,
}

impl<D, P> Clone for ProfileRegistrar<D, P> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            resolver: self.resolver.clone(),
        }
    }
}

impl<D, P> ProfileRegistrar<D, P>
where
    D: ProfileDirectory,
    P: IdentityProvider,
{
    #[must_use]
    pub const fn new(directory: Arc<D>, resolver: ProfileResolver<D, P>) -> Self {
        Self {
            directory,
            resolver,
        }
    }

    /// Register a profile for the signed-in subject.
    ///
    /// Returns the existing profile if the subject already has one.
    ///
    /// # Errors
    ///
    /// Validation failures, a taken hall ticket or email, or a store failure.
    #[instrument(skip(self, form))]
    pub async fn register(&self, form: &Registration) -> Result<Profile, RegistrationError> {
        let session = self
            .resolver
            .session()
            .session()
            .ok_or(RegistrationError::NoSession)?;

        let full_name = required("full name", &form.full_name)?;
        let phone_number = required("phone number", &form.phone_number)?;
        let department = required("department", &form.department)?;
        let academic_year = required("academic year", &form.academic_year)?;
        let email = Email::parse(&form.email)?;
        let hall_ticket = HallTicket::parse(&form.hall_ticket)?;

        if let Some(existing) = self.directory.fetch_profile(&session.subject_id).await? {
            info!("Profile already exists, returning it");
            self.refresh_resolver().await;
            return Ok(existing);
        }

        let hall_ticket_taken = self
            .directory
            .hall_ticket_exists(hall_ticket.as_str())
            .await
            .map_err(|source| RegistrationError::ValidationUnavailable {
                what: "hall ticket",
                source,
            })?;
        if hall_ticket_taken {
            return Err(RegistrationError::HallTicketTaken);
        }

        let email_taken = self
            .directory
            .email_exists(email.as_str())
            .await
            .map_err(|source| RegistrationError::ValidationUnavailable {
                what: "email",
                source,
            })?;
        if email_taken {
            return Err(RegistrationError::EmailTaken);
        }

        let new_profile = NewProfile {
            subject_id: session.subject_id.clone(),
            full_name,
            email,
            phone_number,
            department,
            academic_year,
            hall_ticket,
            profile_picture_url: form.profile_picture_url.clone(),
            email_verified: session.email_verified,
        };

        let profile = match self.directory.create_profile(&new_profile).await {
            Ok(profile) => profile,
            Err(BackendError::Conflict(message)) => {
                warn!(message = %message, "Profile insert hit a uniqueness constraint");
                return Err(RegistrationError::AlreadyRegistered);
            }
            Err(e) => return Err(e.into()),
        };
        info!(profile = %profile.id, "Profile created");

        self.refresh_resolver().await;
        Ok(profile)
    }

    /// Apply an edit to the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// `NoSession` when signed out, `ProfileMissing` when the subject has no
    /// profile yet, or a store or resolver failure.
    #[instrument(skip(self, changes))]
    pub async fn update_profile(
        &self,
        changes: &ProfileChanges,
    ) -> Result<Profile, RegistrationError> {
        let current = match self.resolver.resolve_current().await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Err(RegistrationError::ProfileMissing),
            Err(ProfileError::NoSession) => return Err(RegistrationError::NoSession),
            Err(e) => return Err(e.into()),
        };
        if changes.is_empty() {
            return Ok(current);
        }

        let updated = self.directory.update_profile(current.id, changes).await?;
        self.refresh_resolver().await;
        Ok(updated)
    }

    /// Reload the resolver after a write. The write already landed, so a
    /// failed reload is only logged; the resolver state shows the failure.
    async fn refresh_resolver(&self) {
        if let Err(e) = self.resolver.refetch().await {
            warn!(error = %e, "Profile saved but reload failed");
        }
    }
}

fn required(field: &'static str, value: &str) -> Result<String, RegistrationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RegistrationError::MissingField { field });
    }
    Ok(value.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use campus_core::{ProfileId, SubjectId};
    use chrono::Utc;

    use super::*;
    use crate::backend::IdentityError;
    use crate::models::{AuthEvent, Session};
    use crate::profile::ProfileState;
    use crate::session::SessionStore;
    use crate::storage::SessionStorage;

    struct NoProvider;

    impl IdentityProvider for NoProvider {
        async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
            Ok(None)
        }

        async fn sign_out(&self) -> Result<(), IdentityError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryDirectory {
        rows: Mutex<Vec<Profile>>,
        taken_hall_tickets: Vec<String>,
        conflict_on_insert: bool,
        /// Fetches beyond this many fail.
        fetch_limit: Option<usize>,
        fetches: AtomicUsize,
    }

    impl ProfileDirectory for MemoryDirectory {
        async fn fetch_profile(&self, subject: &SubjectId) -> Result<Option<Profile>, BackendError> {
            let seen = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fetch_limit.is_some_and(|limit| seen >= limit) {
                return Err(BackendError::Unavailable("read replica down".to_owned()));
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.subject_id == *subject)
                .cloned())
        }

        async fn create_profile(&self, profile: &NewProfile) -> Result<Profile, BackendError> {
            if self.conflict_on_insert {
                return Err(BackendError::Conflict("users_hall_ticket_key".to_owned()));
            }
            let row = Profile {
                id: ProfileId::random(),
                subject_id: profile.subject_id.clone(),
                full_name: profile.full_name.clone(),
                email: profile.email.clone(),
                phone_number: profile.phone_number.clone(),
                department: profile.department.clone(),
                academic_year: profile.academic_year.clone(),
                hall_ticket: profile.hall_ticket.clone(),
                profile_picture_url: profile.profile_picture_url.clone(),
                is_active: true,
                email_verified: profile.email_verified,
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }

        async fn update_profile(
            &self,
            id: ProfileId,
            changes: &ProfileChanges,
        ) -> Result<Profile, BackendError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(BackendError::NotFound)?;
            if let Some(department) = &changes.department {
                row.department.clone_from(department);
            }
            Ok(row.clone())
        }

        async fn hall_ticket_exists(&self, hall_ticket: &str) -> Result<bool, BackendError> {
            Ok(self
                .taken_hall_tickets
                .iter()
                .any(|t| t.eq_ignore_ascii_case(hall_ticket)))
        }

        async fn email_exists(&self, _email: &str) -> Result<bool, BackendError> {
            Ok(false)
        }
    }

    fn registrar(
        directory: MemoryDirectory,
    ) -> (
        ProfileRegistrar<MemoryDirectory, NoProvider>,
        ProfileResolver<MemoryDirectory, NoProvider>,
    ) {
        let directory = Arc::new(directory);
        let session = SessionStore::new(NoProvider, SessionStorage::new());
        let now = Utc::now();
        session.apply(AuthEvent::SignedIn(Session {
            subject_id: SubjectId::new("uid-1"),
            email: Email::parse("asha@college.edu").unwrap(),
            email_verified: true,
            issued_at: now,
            expires_at: now + chrono::Duration::hours(1),
        }));
        let resolver = ProfileResolver::new(
            Arc::clone(&directory),
            session,
            Duration::from_secs(10),
            Duration::from_secs(300),
        );
        (ProfileRegistrar::new(directory, resolver.clone()), resolver)
    }

    fn form() -> Registration {
        Registration {
            full_name: "Asha Rao".to_owned(),
            email: "asha@college.edu".to_owned(),
            phone_number: "9876543210".to_owned(),
            department: "CSE".to_owned(),
            academic_year: "3".to_owned(),
            hall_ticket: "2023a51234".to_owned(),
            profile_picture_url: None,
        }
    }

    #[tokio::test]
    async fn test_register_creates_and_refreshes_resolver() {
        let (registrar, resolver) = registrar(MemoryDirectory::default());
        // Resolver has seen the subject as missing
        assert!(resolver.resolve_current().await.unwrap().is_none());

        let profile = registrar.register(&form()).await.unwrap();
        assert_eq!(profile.hall_ticket.as_str(), "2023a51234");
        assert_eq!(resolver.state().profile(), Some(&profile));
    }

    #[tokio::test]
    async fn test_register_twice_returns_existing() {
        let (registrar, _) = registrar(MemoryDirectory::default());
        let first = registrar.register(&form()).await.unwrap();
        let second = registrar.register(&form()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_taken_hall_ticket_is_refused() {
        let (registrar, _) = registrar(MemoryDirectory {
            taken_hall_tickets: vec!["2023A51234".to_owned()],
            ..MemoryDirectory::default()
        });
        let err = registrar.register(&form()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::HallTicketTaken));
        assert_eq!(err.to_string(), "Hall ticket is already registered");
    }

    #[tokio::test]
    async fn test_store_conflict_is_already_registered() {
        let (registrar, _) = registrar(MemoryDirectory {
            conflict_on_insert: true,
            ..MemoryDirectory::default()
        });
        let err = registrar.register(&form()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_missing_field() {
        let (registrar, _) = registrar(MemoryDirectory::default());
        let mut incomplete = form();
        incomplete.department = "  ".to_owned();
        let err = registrar.register(&incomplete).await.unwrap_err();
        assert!(matches!(err, RegistrationError::MissingField { field: "department" }));
    }

    #[tokio::test]
    async fn test_failed_reload_still_returns_created_profile() {
        let (registrar, resolver) = registrar(MemoryDirectory {
            fetch_limit: Some(1),
            ..MemoryDirectory::default()
        });

        let profile = registrar.register(&form()).await.unwrap();
        assert_eq!(profile.full_name, "Asha Rao");
        assert!(matches!(resolver.state(), ProfileState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_update_without_profile() {
        let (registrar, _) = registrar(MemoryDirectory::default());
        let changes = ProfileChanges {
            department: Some("ECE".to_owned()),
            ..ProfileChanges::default()
        };
        let err = registrar.update_profile(&changes).await.unwrap_err();
        assert!(matches!(err, RegistrationError::ProfileMissing));
    }

    #[tokio::test]
    async fn test_update_profile_refetches() {
        let (registrar, resolver) = registrar(MemoryDirectory::default());
        registrar.register(&form()).await.unwrap();

        let changes = ProfileChanges {
            department: Some("ECE".to_owned()),
            ..ProfileChanges::default()
        };
        let updated = registrar.update_profile(&changes).await.unwrap();
        assert_eq!(updated.department, "ECE");
        assert_eq!(resolver.state().profile().unwrap().department, "ECE");
    }
}
