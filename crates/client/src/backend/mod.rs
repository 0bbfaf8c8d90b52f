//! Collaborator boundaries of the client core.
//!
//! # Architecture
//!
//! - [`IdentityProvider`] - external sign-in service, treated as a black box
//! - [`ProfileDirectory`] - profile rows and the two existence checks
//! - [`VerificationEndpoint`] - server-side order verification check
//! - [`OrderStore`] - order and order item writes
//!
//! [`RestBackend`] implements the last three over HTTP against the campus
//! backing service. Tests substitute in-memory implementations.

mod rest;

use std::future::Future;

use thiserror::Error;

use campus_core::{
    NewOrder, NewOrderItems, NewProfile, Order, OrderItem, Profile, ProfileChanges, ProfileId,
    SubjectId,
};

use crate::models::Session;

pub use rest::RestBackend;

/// Errors that can occur when talking to the backing service.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested row does not exist.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many attempts; try again later.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The request took too long.
    #[error("request timed out")]
    Timeout,

    /// The service rejected the request.
    #[error("rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error text from the response body.
        message: String,
    },

    /// The service could not be reached or answered with a server error.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Unavailable(_) | Self::Http(_) | Self::RateLimited(_)
        )
    }

    /// Whether a failed write may still have been applied by the service.
    ///
    /// True when the request could have reached the service but no definite
    /// answer came back: a timeout, a transport failure after connecting, or
    /// a success response with an unreadable body.
    #[must_use]
    pub fn may_have_applied(&self) -> bool {
        match self {
            Self::Timeout | Self::Parse(_) => true,
            Self::Http(e) => !e.is_connect() && !e.is_builder(),
            _ => false,
        }
    }
}

/// Errors reported by the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request.
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),
}

/// The external identity provider.
///
/// State changes after bootstrap are pushed into the session store with
/// [`crate::session::SessionStore::apply`], in the order the provider emits them.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Ask the provider for the session it currently holds.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, IdentityError>> + Send;

    /// End the provider-side session.
    fn sign_out(&self) -> impl Future<Output = Result<(), IdentityError>> + Send;
}

/// Profile rows in the backing store.
pub trait ProfileDirectory: Send + Sync + 'static {
    /// Fetch the profile belonging to a subject. `Ok(None)` if there is none.
    fn fetch_profile(
        &self,
        subject: &SubjectId,
    ) -> impl Future<Output = Result<Option<Profile>, BackendError>> + Send;

    /// Insert a new profile row.
    fn create_profile(
        &self,
        profile: &NewProfile,
    ) -> impl Future<Output = Result<Profile, BackendError>> + Send;

    /// Apply an edit to an existing profile row.
    fn update_profile(
        &self,
        id: ProfileId,
        changes: &ProfileChanges,
    ) -> impl Future<Output = Result<Profile, BackendError>> + Send;

    /// `check_hall_ticket_exists` server function.
    fn hall_ticket_exists(
        &self,
        hall_ticket: &str,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    /// `check_email_exists` server function.
    fn email_exists(&self, email: &str)
    -> impl Future<Output = Result<bool, BackendError>> + Send;
}

/// Result of one server-side verification check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationReply {
    /// The candidate matched; carries the opaque session token.
    Passed {
        /// Opaque token to keep in session storage.
        token: String,
    },
    /// The candidate did not match.
    Failed {
        /// User-facing reason.
        error: String,
    },
    /// Too many failed attempts for this subject.
    RateLimited {
        /// User-facing reason.
        error: String,
    },
}

/// The server-side order verification check.
pub trait VerificationEndpoint: Send + Sync + 'static {
    /// Submit a candidate password for a subject.
    fn verify(
        &self,
        candidate: &str,
        subject: &SubjectId,
    ) -> impl Future<Output = Result<VerificationReply, BackendError>> + Send;
}

/// Order rows in the backing store.
///
/// The two writes are independent requests; no transaction spans them.
pub trait OrderStore: Send + Sync + 'static {
    /// Insert one order row.
    fn insert_order(&self, order: &NewOrder)
    -> impl Future<Output = Result<Order, BackendError>> + Send;

    /// Insert the item rows of one order.
    fn insert_items(
        &self,
        items: &NewOrderItems,
    ) -> impl Future<Output = Result<Vec<OrderItem>, BackendError>> + Send;
}
