//! Session store: who, if anyone, is signed in.
//!
//! State is published through a `tokio::sync::watch` channel. Subscribers see
//! `Loading` until the identity provider has answered, then every change in
//! the order the provider emitted it.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::{IdentityError, IdentityProvider};
use crate::models::{AuthEvent, Session, SessionState};
use crate::storage::SessionStorage;

/// Errors surfaced by the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The provider failed to end its session. Local state was cleared anyway.
    #[error("sign-out was not confirmed by the identity provider: {0}")]
    SignOutUnconfirmed(#[from] IdentityError),
}

/// Single source of truth for the current identity session.
///
/// Cheaply cloneable; clones share state.
pub struct SessionStore<P> {
    inner: Arc<SessionStoreInner<P>>,
}

struct SessionStoreInner<P> {
    provider: P,
    state: watch::Sender<SessionState>,
    storage: SessionStorage,
}

impl<P> Clone for SessionStore<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: IdentityProvider> SessionStore<P> {
    /// Create a store in the `Loading` state.
    #[must_use]
    pub fn new(provider: P, storage: SessionStorage) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            inner: Arc::new(SessionStoreInner {
                provider,
                state,
                storage,
            }),
        }
    }

    /// Ask the provider for its current session and settle the store.
    ///
    /// Provider errors are logged and treated as signed out. If an auth event
    /// arrived while the request was in flight, that newer state is kept.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> SessionState {
        let resolved = match self.inner.provider.current_session().await {
            Ok(Some(session)) => SessionState::SignedIn(session),
            Ok(None) => SessionState::SignedOut,
            Err(e) => {
                warn!(error = %e, "Auth bootstrap failed, continuing signed out");
                SessionState::SignedOut
            }
        }
        .normalized(Utc::now());

        let applied = self.inner.state.send_if_modified(|current| {
            if current.is_settled() {
                false
            } else {
                *current = resolved;
                true
            }
        });
        if !applied {
            debug!("Session already settled by a provider event");
        }

        self.state()
    }

    /// Apply a provider event, replacing the state wholesale.
    ///
    /// Signing out, or signing in as a different subject, drops every
    /// session-scoped value, including the verification token.
    pub fn apply(&self, event: AuthEvent) {
        let next = event.into_state().normalized(Utc::now());
        let previous = self.inner.state.send_replace(next.clone());

        let subject_changed = match (previous.subject(), next.subject()) {
            (Some(before), Some(after)) => before != after,
            (Some(_), None) => true,
            _ => false,
        };
        if subject_changed || matches!(next, SessionState::SignedOut) {
            self.inner.storage.clear();
        }

        info!(
            signed_in = next.session().is_some(),
            subject_changed, "Session state changed"
        );
    }

    /// The last known state, with an expired session reported as signed out.
    ///
    /// Never touches the network.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone().normalized(Utc::now())
    }

    /// The last known session, if signed in.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        match self.state() {
            SessionState::SignedIn(session) => Some(session),
            SessionState::Loading | SessionState::SignedOut => None,
        }
    }

    /// Receive every state change.
    ///
    /// The receiver reports a change immediately, so the first `changed()`
    /// always yields the current state, `Loading` included.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        let mut rx = self.inner.state.subscribe();
        rx.mark_changed();
        rx
    }

    /// Invoke `listener` with the current state and every later change.
    ///
    /// The task ends once every clone of the store has been dropped.
    pub fn listen<F>(&self, mut listener: F) -> JoinHandle<()>
    where
        F: FnMut(&SessionState) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone().normalized(Utc::now());
                listener(&state);
            }
        })
    }

    /// Wait until the provider has answered, then return the state.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(SessionState::is_settled).await;
        self.state()
    }

    /// Session-scoped storage tied to this session.
    #[must_use]
    pub fn storage(&self) -> &SessionStorage {
        &self.inner.storage
    }

    /// End the session.
    ///
    /// Local state is cleared whether or not the provider confirms. A
    /// provider failure is logged and returned, never fatal.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SignOutUnconfirmed` if the provider call failed.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let result = self.inner.provider.sign_out().await;

        self.inner.storage.clear();
        self.inner.state.send_replace(SessionState::SignedOut);

        match result {
            Ok(()) => {
                info!("Signed out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Provider sign-out failed, local session cleared");
                Err(SessionError::SignOutUnconfirmed(e))
            }
        }
    }
}
