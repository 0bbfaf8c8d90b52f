//! Single construction point for the client core.
//!
//! [`CampusClient`] builds every component around one session storage and
//! one backend, and is the only place that coordinates them: sign-out clears
//! profile and verification state, order placement checks every
//! precondition first.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use campus_core::{PaymentMethod, Profile, ProfileChanges};

use crate::backend::{
    BackendError, IdentityProvider, OrderStore, ProfileDirectory, RestBackend,
    VerificationEndpoint,
};
use crate::cart::Cart;
use crate::config::ClientConfig;
use crate::guard::{GuardPolicy, GuardState, RouteGuard};
use crate::models::{AuthEvent, SessionState};
use crate::orders::{Checkout, OrderComposer, PlacementError, PlacementReceipt};
use crate::profile::{ProfileError, ProfileResolver};
use crate::registration::{ProfileRegistrar, Registration, RegistrationError};
use crate::session::{SessionError, SessionStore};
use crate::storage::{ResetLinkWindow, SessionStorage};
use crate::verification::{VerificationError, VerificationGate, VerificationOutcome};

/// The wired-up client core.
pub struct CampusClient<B, P> {
    config: ClientConfig,
    session: SessionStore<P>,
    profiles: ProfileResolver<B, P>,
    verification: VerificationGate<B>,
    registrar: ProfileRegistrar<B, P>,
    composer: OrderComposer<B>,
    reset_link: ResetLinkWindow,
}

impl<P: IdentityProvider> CampusClient<RestBackend, P> {
    /// Build a client talking HTTP to the configured backing service.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the HTTP client cannot be built.
    pub fn connect(config: ClientConfig, provider: P) -> Result<Self, BackendError> {
        let backend = RestBackend::new(&config)?;
        Ok(Self::new(config, backend, provider))
    }
}

impl<B, P> CampusClient<B, P>
where
    B: ProfileDirectory + VerificationEndpoint + OrderStore,
    P: IdentityProvider,
{
    /// Wire every component around `backend` and `provider`.
    #[must_use]
    pub fn new(config: ClientConfig, backend: B, provider: P) -> Self {
        let backend = Arc::new(backend);
        let storage = SessionStorage::new();

        let session = SessionStore::new(provider, storage.clone());
        let profiles = ProfileResolver::new(
            Arc::clone(&backend),
            session.clone(),
            config.profile_timeout,
            config.profile_cache_ttl,
        );
        let verification = VerificationGate::new(Arc::clone(&backend), storage.clone());
        let registrar = ProfileRegistrar::new(Arc::clone(&backend), profiles.clone());
        let composer = OrderComposer::new(backend, config.pickup_window);
        let reset_link = ResetLinkWindow::new(storage, config.reset_link_window);

        Self {
            config,
            session,
            profiles,
            verification,
            registrar,
            composer,
            reset_link,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn session(&self) -> &SessionStore<P> {
        &self.session
    }

    #[must_use]
    pub const fn profiles(&self) -> &ProfileResolver<B, P> {
        &self.profiles
    }

    #[must_use]
    pub const fn verification(&self) -> &VerificationGate<B> {
        &self.verification
    }

    #[must_use]
    pub const fn reset_link(&self) -> &ResetLinkWindow {
        &self.reset_link
    }

    /// Settle the session from the identity provider.
    pub async fn bootstrap(&self) -> SessionState {
        self.session.bootstrap().await
    }

    /// Push an identity provider event into the session store.
    ///
    /// Profile state belonging to another subject is dropped.
    pub fn apply_auth_event(&self, event: AuthEvent) {
        self.session.apply(event);

        let session = self.session.state();
        let profile = self.profiles.state();
        if profile.subject().is_some() && profile.subject() != session.subject() {
            debug!("Session subject changed, clearing profile state");
            self.profiles.clear();
            self.verification.dismiss_prompt();
        }
    }

    /// Sign out and drop every piece of session-scoped state.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the provider did not confirm; local state is
    /// cleared regardless.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let result = self.session.sign_out().await;
        self.profiles.clear();
        self.verification.clear();
        result
    }

    /// Decide whether a protected view may render.
    ///
    /// Resolves the profile when the policy needs it and returns as soon as
    /// the guard reaches a terminal state, without waiting on a fetch that
    /// can no longer change the answer.
    #[instrument(skip(self))]
    pub async fn check_route(&self, policy: GuardPolicy) -> GuardState {
        let guard = RouteGuard::new(policy);
        let settle = guard.settle(self.session.subscribe(), self.profiles.subscribe());

        let resolve = async {
            if !policy.require_profile {
                return;
            }
            // A superseded fetch means a newer subject needs resolving
            while let Err(ProfileError::Superseded(_)) = self.profiles.resolve_current().await {}
        };

        tokio::pin!(settle, resolve);
        tokio::select! {
            biased;
            state = &mut settle => state,
            () = &mut resolve => settle.await,
        }
    }

    /// Submit the order verification password for the signed-in user.
    ///
    /// # Errors
    ///
    /// `NoSession` when signed out, otherwise as [`VerificationGate::verify`].
    pub async fn verify(&self, candidate: &str) -> Result<VerificationOutcome, VerificationError> {
        let subject = self
            .session
            .session()
            .map(|s| s.subject_id)
            .ok_or(VerificationError::NoSession)?;
        self.verification.verify(&subject, candidate).await
    }

    /// Checkout for `cart` with the configured service fee rate.
    #[must_use]
    pub fn checkout(
        &self,
        cart: &Cart,
        payment_method: PaymentMethod,
        notes: Option<String>,
    ) -> Checkout {
        Checkout {
            payment_method,
            notes: notes.filter(|n| !n.trim().is_empty()),
            service_fee: cart.service_fee(self.config.service_fee_rate),
        }
    }

    /// Place the cart as one order per vendor.
    ///
    /// Without a verification token the prompt is raised and nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Precondition failures (`NotSignedIn`, `ProfileMissing`,
    /// `ProfileUnavailable`, `VerificationRequired`) or any
    /// [`OrderComposer::place`] error.
    #[instrument(skip(self, cart, checkout))]
    pub async fn place_order(
        &self,
        cart: &mut Cart,
        checkout: &Checkout,
    ) -> Result<PlacementReceipt, PlacementError> {
        let session = self.session.session().ok_or(PlacementError::NotSignedIn)?;

        let profile = match self.profiles.resolve(&session.subject_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Err(PlacementError::ProfileMissing),
            Err(ProfileError::NoSession) => return Err(PlacementError::NotSignedIn),
            Err(e) => {
                warn!(error = %e, "Profile unavailable at checkout");
                return Err(PlacementError::ProfileUnavailable(e));
            }
        };

        if !self.verification.is_verified() {
            self.verification.request_verification();
            return Err(PlacementError::VerificationRequired);
        }

        self.composer.place(profile.id, cart, checkout).await
    }

    /// Register a profile for the signed-in subject.
    ///
    /// # Errors
    ///
    /// As [`ProfileRegistrar::register`].
    pub async fn register(&self, form: &Registration) -> Result<Profile, RegistrationError> {
        self.registrar.register(form).await
    }

    /// Edit the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// As [`ProfileRegistrar::update_profile`].
    pub async fn update_profile(
        &self,
        changes: &ProfileChanges,
    ) -> Result<Profile, RegistrationError> {
        self.registrar.update_profile(changes).await
    }

    /// Service fee rate applied by [`Self::checkout`].
    #[must_use]
    pub const fn service_fee_rate(&self) -> Decimal {
        self.config.service_fee_rate
    }
}
