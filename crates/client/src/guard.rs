//! Protected-route guard.
//!
//! ```text
//! CheckingAuth ──no session──────────────────────────> RedirectLogin
//!      │ ──email unverified (when required)──────────> RedirectLogin { notice }
//!      └─session ok─> CheckingProfile ──no profile───> RedirectCreateProfile
//!                           │ ──fetch failed─────────> ProfileUnavailable
//!                           └─profile ok─────────────> Render
//! ```
//!
//! The guard holds in a `Checking*` state while either input is loading and
//! stops at the first terminal state it reaches. A guard is used for one
//! mount; a new mount gets a new guard.

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::models::SessionState;
use crate::profile::ProfileState;

/// What a protected view requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    /// Redirect to login while the provider has not confirmed the email.
    pub require_email_verified: bool,
    /// Redirect to profile creation when no profile exists.
    pub require_profile: bool,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            require_email_verified: true,
            require_profile: true,
        }
    }
}

/// Why the login page is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginNotice {
    EmailUnverified,
}

/// Guard progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    CheckingAuth,
    CheckingProfile,
    Render,
    RedirectLogin { notice: Option<LoginNotice> },
    RedirectCreateProfile,
    /// The profile could not be loaded; the view offers a retry.
    ProfileUnavailable { message: String },
}

impl GuardState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::CheckingAuth | Self::CheckingProfile)
    }
}

/// One-shot decision for a single mount of a protected view.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    policy: GuardPolicy,
    state: GuardState,
}

impl RouteGuard {
    #[must_use]
    pub const fn new(policy: GuardPolicy) -> Self {
        Self {
            policy,
            state: GuardState::CheckingAuth,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &GuardState {
        &self.state
    }

    /// Feed the latest inputs. Once terminal, the state no longer changes.
    pub fn observe(&mut self, session: &SessionState, profile: &ProfileState) -> &GuardState {
        if !self.state.is_terminal() {
            let next = evaluate(self.policy, session, profile);
            if next != self.state {
                debug!(from = ?self.state, to = ?next, "Guard transition");
                self.state = next;
            }
        }
        &self.state
    }

    /// Follow both inputs until a terminal state is reached.
    ///
    /// If either input closes first, the last state reached is returned.
    pub async fn settle(
        mut self,
        mut session: watch::Receiver<SessionState>,
        mut profile: watch::Receiver<ProfileState>,
    ) -> GuardState {
        loop {
            let session_now = session.borrow_and_update().clone().normalized(Utc::now());
            let profile_now = profile.borrow_and_update().clone();
            if self.observe(&session_now, &profile_now).is_terminal() {
                return self.state;
            }

            let changed = tokio::select! {
                r = session.changed() => r,
                r = profile.changed() => r,
            };
            if changed.is_err() {
                return self.state;
            }
        }
    }
}

fn evaluate(policy: GuardPolicy, session: &SessionState, profile: &ProfileState) -> GuardState {
    let session = match session {
        SessionState::Loading => return GuardState::CheckingAuth,
        SessionState::SignedOut => return GuardState::RedirectLogin { notice: None },
        SessionState::SignedIn(session) => session,
    };

    if policy.require_email_verified && !session.email_verified {
        return GuardState::RedirectLogin {
            notice: Some(LoginNotice::EmailUnverified),
        };
    }
    if !policy.require_profile {
        return GuardState::Render;
    }

    // A state left over from another subject is not an answer for this one
    if profile.subject() != Some(&session.subject_id) {
        return GuardState::CheckingProfile;
    }
    match profile {
        ProfileState::Ready(_) => GuardState::Render,
        ProfileState::Missing(_) => GuardState::RedirectCreateProfile,
        ProfileState::Failed { error, .. } => GuardState::ProfileUnavailable {
            message: error.user_message().to_owned(),
        },
        ProfileState::Idle | ProfileState::Loading(_) => GuardState::CheckingProfile,
    }
}
