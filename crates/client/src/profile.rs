//! Profile resolver: maps the signed-in subject to its profile row.
//!
//! # De-duplication
//!
//! Fetches go through a `moka` cache keyed by subject. Concurrent callers for
//! the same subject share one in-flight request (`try_get_with` coalesces
//! initialisation), and errors are never cached, so a retry always hits the
//! network. `refetch` invalidates the entry before resolving again.
//!
//! # Staleness
//!
//! A response is applied only if its subject is still the current one when it
//! arrives. Otherwise it is dropped and the caller gets
//! [`ProfileError::Superseded`].

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use campus_core::{Profile, SubjectId};

use crate::backend::{BackendError, IdentityProvider, ProfileDirectory};
use crate::models::SessionState;
use crate::session::SessionStore;

/// Errors from resolving a profile.
///
/// A missing profile is not an error; it resolves to `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// The fetch exceeded its upper bound and was abandoned.
    #[error("profile fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Network or server failure.
    #[error("profile fetch failed: {0}")]
    Transient(String),

    /// The session moved on to another subject before the response arrived.
    #[error("profile response for {0} was superseded")]
    Superseded(SubjectId),

    /// The identity provider has not answered yet.
    #[error("session is still loading")]
    SessionNotSettled,

    /// Nobody is signed in.
    #[error("no active session")]
    NoSession,
}

impl ProfileError {
    /// Whether the UI should offer a retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout(_) | Self::Transient(_) => "Failed to load your profile. Please retry.",
            Self::Superseded(_) | Self::SessionNotSettled => "Loading your profile...",
            Self::NoSession => "Please sign in to continue.",
        }
    }
}

/// What the resolver currently knows about the signed-in user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProfileState {
    /// Nothing requested yet, or cleared on sign-out.
    #[default]
    Idle,
    /// A fetch for this subject is in flight.
    Loading(SubjectId),
    /// The profile was found.
    Ready(Profile),
    /// The subject has no profile row; registration is incomplete.
    Missing(SubjectId),
    /// The fetch failed.
    Failed {
        subject: SubjectId,
        error: ProfileError,
    },
}

impl ProfileState {
    /// Whether a fetch is in flight or has not started.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Idle | Self::Loading(_))
    }

    /// The subject this state belongs to.
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectId> {
        match self {
            Self::Idle => None,
            Self::Loading(subject) | Self::Missing(subject) | Self::Failed { subject, .. } => {
                Some(subject)
            }
            Self::Ready(profile) => Some(&profile.subject_id),
        }
    }

    /// The profile, if found.
    #[must_use]
    pub const fn profile(&self) -> Option<&Profile> {
        match self {
            Self::Ready(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Cached result of one lookup.
#[derive(Debug, Clone)]
enum ProfileLookup {
    Found(Profile),
    Missing,
}

impl ProfileLookup {
    fn into_state(self, subject: &SubjectId) -> ProfileState {
        match self {
            Self::Found(profile) => ProfileState::Ready(profile),
            Self::Missing => ProfileState::Missing(subject.clone()),
        }
    }

    fn into_profile(self) -> Option<Profile> {
        match self {
            Self::Found(profile) => Some(profile),
            Self::Missing => None,
        }
    }
}

/// Resolves profiles with one in-flight fetch per subject.
///
/// Cheaply cloneable; clones share the cache and published state. Never
/// creates or edits a profile.
pub struct ProfileResolver<D, P> {
    inner: Arc<ResolverInner<D, P>>,
}

struct ResolverInner<D, P> {
    directory: Arc<D>,
    session: SessionStore<P>,
    cache: Cache<SubjectId, ProfileLookup>,
    state: watch::Sender<ProfileState>,
    fetch_timeout: Duration,
}

impl<D, P> Clone for ProfileResolver<D, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, P> ProfileResolver<D, P>
where
    D: ProfileDirectory,
    P: IdentityProvider,
{
    /// Create a resolver.
    ///
    /// `fetch_timeout` bounds each network fetch; `cache_ttl` is how long a
    /// resolved lookup is reused.
    #[must_use]
    pub fn new(
        directory: Arc<D>,
        session: SessionStore<P>,
        fetch_timeout: Duration,
        cache_ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(64)
            .time_to_live(cache_ttl)
            .build();
        let (state, _) = watch::channel(ProfileState::Idle);

        Self {
            inner: Arc::new(ResolverInner {
                directory,
                session,
                cache,
                state,
                fetch_timeout,
            }),
        }
    }

    /// Resolve the profile of `subject`, which must be the current subject.
    ///
    /// `Ok(None)` means the subject has no profile yet.
    ///
    /// # Errors
    ///
    /// - `SessionNotSettled` / `NoSession` / `Superseded` if `subject` is not
    ///   the settled current subject, before or after the fetch
    /// - `Timeout` / `Transient` if the fetch failed; both are retryable
    #[instrument(skip(self), fields(subject = %subject))]
    pub async fn resolve(&self, subject: &SubjectId) -> Result<Option<Profile>, ProfileError> {
        self.ensure_current(subject)?;

        if let Some(lookup) = self.inner.cache.get(subject).await {
            debug!("Profile served from cache");
            self.publish_for(subject, lookup.clone().into_state(subject));
            return Ok(lookup.into_profile());
        }

        self.publish_for(subject, ProfileState::Loading(subject.clone()));

        let directory = Arc::clone(&self.inner.directory);
        let key = subject.clone();
        let fetch = self.inner.cache.try_get_with(subject.clone(), async move {
            match directory.fetch_profile(&key).await {
                Ok(Some(profile)) => Ok(ProfileLookup::Found(profile)),
                Ok(None) | Err(BackendError::NotFound) => Ok(ProfileLookup::Missing),
                Err(e) => Err(e),
            }
        });

        let outcome = match tokio::time::timeout(self.inner.fetch_timeout, fetch).await {
            Ok(Ok(lookup)) => Ok(lookup),
            Ok(Err(e)) => Err(ProfileError::Transient(e.to_string())),
            Err(_) => Err(ProfileError::Timeout(self.inner.fetch_timeout)),
        };

        if self.ensure_current(subject).is_err() {
            debug!("Discarding profile response for superseded subject");
            self.inner.cache.invalidate(subject).await;
            return Err(ProfileError::Superseded(subject.clone()));
        }

        match outcome {
            Ok(lookup) => {
                self.publish_for(subject, lookup.clone().into_state(subject));
                Ok(lookup.into_profile())
            }
            Err(error) => {
                warn!(error = %error, "Profile fetch failed");
                self.publish_for(
                    subject,
                    ProfileState::Failed {
                        subject: subject.clone(),
                        error: error.clone(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Wait for the session to settle, then resolve the current subject.
    ///
    /// # Errors
    ///
    /// `NoSession` if nobody is signed in, otherwise as [`Self::resolve`].
    pub async fn resolve_current(&self) -> Result<Option<Profile>, ProfileError> {
        let state = self.inner.session.settled().await;
        match state.subject() {
            Some(subject) => self.resolve(subject).await,
            None => {
                self.inner.state.send_replace(ProfileState::Idle);
                Err(ProfileError::NoSession)
            }
        }
    }

    /// Drop the cached lookup for the current subject and resolve again.
    ///
    /// # Errors
    ///
    /// As [`Self::resolve_current`].
    #[instrument(skip(self))]
    pub async fn refetch(&self) -> Result<Option<Profile>, ProfileError> {
        if let Some(subject) = self.inner.session.state().subject() {
            self.inner.cache.invalidate(subject).await;
        }
        self.resolve_current().await
    }

    /// Forget every cached lookup and go back to `Idle`.
    pub fn clear(&self) {
        self.inner.cache.invalidate_all();
        self.inner.state.send_replace(ProfileState::Idle);
    }

    /// The currently published state.
    #[must_use]
    pub fn state(&self) -> ProfileState {
        self.inner.state.borrow().clone()
    }

    /// Receive every state change, starting with the current one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        let mut rx = self.inner.state.subscribe();
        rx.mark_changed();
        rx
    }

    /// The session store this resolver follows.
    #[must_use]
    pub fn session(&self) -> &SessionStore<P> {
        &self.inner.session
    }

    fn ensure_current(&self, subject: &SubjectId) -> Result<(), ProfileError> {
        match self.inner.session.state() {
            SessionState::Loading => Err(ProfileError::SessionNotSettled),
            SessionState::SignedOut => Err(ProfileError::NoSession),
            SessionState::SignedIn(session) if session.subject_id == *subject => Ok(()),
            SessionState::SignedIn(_) => Err(ProfileError::Superseded(subject.clone())),
        }
    }

    /// Publish `next` unless the session has moved on from `subject`.
    fn publish_for(&self, subject: &SubjectId, next: ProfileState) {
        let current = self.inner.session.state();
        if current.subject() == Some(subject) {
            self.inner.state.send_replace(next);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use campus_core::{Email, HallTicket, NewProfile, ProfileChanges, ProfileId};
    use chrono::Utc;

    use super::*;
    use crate::backend::IdentityError;
    use crate::models::{AuthEvent, Session};
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
    struct CountingDirectory {
        fetches: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    impl ProfileDirectory for CountingDirectory {
        async fn fetch_profile(&self, subject: &SubjectId) -> Result<Option<Profile>, BackendError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(BackendError::Unavailable("down".to_owned()));
            }
            if subject.as_str() == "uid-new" {
                return Ok(None);
            }
            Ok(Some(profile(subject)))
        }

        async fn create_profile(&self, _profile: &NewProfile) -> Result<Profile, BackendError> {
            Err(BackendError::Unavailable("read only".to_owned()))
        }

        async fn update_profile(
            &self,
            _id: ProfileId,
            _changes: &ProfileChanges,
        ) -> Result<Profile, BackendError> {
            Err(BackendError::Unavailable("read only".to_owned()))
        }

        async fn hall_ticket_exists(&self, _hall_ticket: &str) -> Result<bool, BackendError> {
            Ok(false)
        }

        async fn email_exists(&self, _email: &str) -> Result<bool, BackendError> {
            Ok(false)
        }
    }

    fn profile(subject: &SubjectId) -> Profile {
        Profile {
            id: ProfileId::random(),
            subject_id: subject.clone(),
            full_name: "Asha Rao".to_owned(),
            email: Email::parse("asha@college.edu").unwrap(),
            phone_number: "9876543210".to_owned(),
            department: "CSE".to_owned(),
            academic_year: "3".to_owned(),
            hall_ticket: HallTicket::parse("2023A51234").unwrap(),
            profile_picture_url: None,
            is_active: true,
            email_verified: true,
        }
    }

    fn signed_in(subject: &str) -> AuthEvent {
        let now = Utc::now();
        AuthEvent::SignedIn(Session {
            subject_id: SubjectId::new(subject),
            email: Email::parse("asha@college.edu").unwrap(),
            email_verified: true,
            issued_at: now,
            expires_at: now + chrono::Duration::hours(1),
        })
    }

    fn resolver(
        directory: CountingDirectory,
    ) -> (
        ProfileResolver<CountingDirectory, NoProvider>,
        Arc<CountingDirectory>,
    ) {
        let directory = Arc::new(directory);
        let session = SessionStore::new(NoProvider, SessionStorage::new());
        let resolver = ProfileResolver::new(
            Arc::clone(&directory),
            session,
            Duration::from_secs(10),
            Duration::from_secs(300),
        );
        (resolver, directory)
    }

    #[tokio::test]
    async fn test_refuses_before_session_settles() {
        let (resolver, directory) = resolver(CountingDirectory::default());
        let err = resolver.resolve(&SubjectId::new("uid-1")).await.unwrap_err();
        assert_eq!(err, ProfileError::SessionNotSettled);
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolves_and_caches() {
        let (resolver, directory) = resolver(CountingDirectory::default());
        resolver.session().apply(signed_in("uid-1"));
        let subject = SubjectId::new("uid-1");

        let first = resolver.resolve(&subject).await.unwrap().unwrap();
        let second = resolver.resolve(&subject).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.state(), ProfileState::Ready(first));
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_an_error() {
        let (resolver, _) = resolver(CountingDirectory::default());
        resolver.session().apply(signed_in("uid-new"));
        let subject = SubjectId::new("uid-new");

        assert!(resolver.resolve(&subject).await.unwrap().is_none());
        assert_eq!(resolver.state(), ProfileState::Missing(subject));
    }

    #[tokio::test]
    async fn test_failure_is_retryable_and_not_cached() {
        let (resolver, directory) = resolver(CountingDirectory {
            fail: true,
            ..CountingDirectory::default()
        });
        resolver.session().apply(signed_in("uid-1"));
        let subject = SubjectId::new("uid-1");

        let err = resolver.resolve(&subject).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(resolver.state(), ProfileState::Failed { .. }));

        let _ = resolver.resolve(&subject).await;
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let (resolver, _) = resolver(CountingDirectory {
            delay: Some(Duration::from_secs(60)),
            ..CountingDirectory::default()
        });
        resolver.session().apply(signed_in("uid-1"));

        let err = resolver.resolve(&SubjectId::new("uid-1")).await.unwrap_err();
        assert_eq!(err, ProfileError::Timeout(Duration::from_secs(10)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_refetch_bypasses_cache() {
        let (resolver, directory) = resolver(CountingDirectory::default());
        resolver.session().apply(signed_in("uid-1"));

        resolver.resolve_current().await.unwrap();
        resolver.refetch().await.unwrap();
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_returns_to_idle() {
        let (resolver, _) = resolver(CountingDirectory::default());
        resolver.session().apply(signed_in("uid-1"));
        resolver.resolve_current().await.unwrap();

        resolver.clear();
        assert_eq!(resolver.state(), ProfileState::Idle);
    }
}
