//! Session-related types.
//!
//! A [`Session`] is replaced wholesale on every identity-provider event and
//! never mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_core::{Email, SubjectId};

/// The identity provider's view of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Provider subject.
    pub subject_id: SubjectId,
    /// Provider email address.
    pub email: Email,
    /// Whether the provider has confirmed the email address.
    pub email_verified: bool,
    /// When the current token was issued.
    pub issued_at: DateTime<Utc>,
    /// When the current token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What the session store currently knows.
///
/// `Loading` is distinct from `SignedOut`: it means the provider has not
/// answered yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the provider's first answer.
    #[default]
    Loading,
    /// Nobody is signed in.
    SignedOut,
    /// A user is signed in.
    SignedIn(Session),
}

impl SessionState {
    /// Finished loading, whatever the outcome.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    /// The session, if signed in.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(session) => Some(session),
            Self::Loading | Self::SignedOut => None,
        }
    }

    /// The signed-in subject, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectId> {
        self.session().map(|s| &s.subject_id)
    }

    /// Treat an expired session as signed out.
    #[must_use]
    pub fn normalized(self, now: DateTime<Utc>) -> Self {
        match self {
            Self::SignedIn(session) if session.is_expired(now) => Self::SignedOut,
            other => other,
        }
    }
}

/// An authentication state change reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in.
    SignedIn(Session),
    /// The provider issued a fresh token for the current user.
    TokenRefreshed(Session),
    /// The user signed out, or the provider dropped the session.
    SignedOut,
}

impl AuthEvent {
    /// The state this event leads to.
    #[must_use]
    pub fn into_state(self) -> SessionState {
        match self {
            Self::SignedIn(session) | Self::TokenRefreshed(session) => {
                SessionState::SignedIn(session)
            }
            Self::SignedOut => SessionState::SignedOut,
        }
    }
}
