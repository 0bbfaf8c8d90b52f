//! Order verification gate.
//!
//! Before placing an order the user re-enters a derived password. The check
//! itself happens server-side; the client only forwards the candidate and
//! keeps the opaque token it gets back in session storage. A failed attempt
//! never touches a token that is already there, and a pass that arrives after
//! the session was cleared is dropped.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use campus_core::SubjectId;

use crate::backend::{BackendError, VerificationEndpoint, VerificationReply};
use crate::storage::{SessionStorage, keys};

const RATE_LIMITED_MESSAGE: &str = "Too many verification attempts. Please try again later.";

/// Result of a completed verification check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The candidate matched; the session is now verified.
    Verified,
    /// Wrong candidate.
    Rejected { message: String },
    /// Too many recent failures; distinct from a wrong candidate.
    RateLimited { message: String },
}

/// Reasons a verification check could not be completed.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("no active session")]
    NoSession,

    #[error("please enter your verification password")]
    EmptyCandidate,

    #[error("could not find your profile - please log out and back in")]
    ProfileMissing,

    #[error("verification is unavailable: {0}")]
    Unavailable(#[source] BackendError),

    /// The session ended while the check was in flight.
    #[error("your session changed, please verify again")]
    SessionEnded,
}

/// Per-session re-authentication step guarding order placement.
///
/// Cheaply cloneable; clones share the prompt state and storage.
pub struct VerificationGate<V> {
    inner: Arc<GateInner<V>>,
}

struct GateInner<V> {
    endpoint: Arc<V>,
    storage: SessionStorage,
    prompt: watch::Sender<bool>,
}

impl<V> Clone for VerificationGate<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: VerificationEndpoint> VerificationGate<V> {
    #[must_use]
    pub fn new(endpoint: Arc<V>, storage: SessionStorage) -> Self {
        let (prompt, _) = watch::channel(false);
        Self {
            inner: Arc::new(GateInner {
                endpoint,
                storage,
                prompt,
            }),
        }
    }

    /// Whether this session holds a verification token.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.inner.storage.contains(keys::VERIFICATION_TOKEN)
    }

    /// Ask the UI to show the verification prompt. Performs no check.
    pub fn request_verification(&self) {
        self.inner.prompt.send_replace(true);
    }

    /// Hide the verification prompt.
    pub fn dismiss_prompt(&self) {
        self.inner.prompt.send_replace(false);
    }

    /// Whether the prompt should be visible.
    #[must_use]
    pub fn prompt_visible(&self) -> bool {
        *self.inner.prompt.borrow()
    }

    /// Follow prompt visibility changes.
    #[must_use]
    pub fn subscribe_prompt(&self) -> watch::Receiver<bool> {
        self.inner.prompt.subscribe()
    }

    /// Submit a candidate password for `subject`.
    ///
    /// On success the returned token is stored and the prompt is dismissed.
    /// Rejections and rate limits leave any stored token in place.
    ///
    /// # Errors
    ///
    /// - `EmptyCandidate` for a blank candidate, without calling the server
    /// - `ProfileMissing` if the server has no profile for the subject
    /// - `SessionEnded` if the session storage was cleared (sign-out or a
    ///   subject switch) before a passing reply arrived
    /// - `Unavailable` for any other backing service failure
    #[instrument(skip(self, candidate), fields(subject = %subject))]
    pub async fn verify(
        &self,
        subject: &SubjectId,
        candidate: &str,
    ) -> Result<VerificationOutcome, VerificationError> {
        if candidate.trim().is_empty() {
            return Err(VerificationError::EmptyCandidate);
        }
        if subject.is_blank() {
            return Err(VerificationError::NoSession);
        }

        let generation = self.inner.storage.generation();
        let reply = match self.inner.endpoint.verify(candidate, subject).await {
            Ok(reply) => reply,
            Err(BackendError::NotFound) => return Err(VerificationError::ProfileMissing),
            Err(BackendError::RateLimited(_)) => {
                return Ok(VerificationOutcome::RateLimited {
                    message: RATE_LIMITED_MESSAGE.to_owned(),
                });
            }
            Err(e) => {
                warn!(error = %e, "Verification request failed");
                return Err(VerificationError::Unavailable(e));
            }
        };

        Ok(match reply {
            VerificationReply::Passed { token } => {
                let stored =
                    self.inner
                        .storage
                        .set_in_generation(generation, keys::VERIFICATION_TOKEN, token);
                if !stored {
                    warn!("Session cleared during verification, dropping token");
                    return Err(VerificationError::SessionEnded);
                }
                self.dismiss_prompt();
                info!("Order verification passed");
                VerificationOutcome::Verified
            }
            VerificationReply::Failed { error } => {
                info!("Order verification rejected");
                VerificationOutcome::Rejected { message: error }
            }
            VerificationReply::RateLimited { .. } => {
                warn!("Order verification rate limited");
                VerificationOutcome::RateLimited {
                    message: RATE_LIMITED_MESSAGE.to_owned(),
                }
            }
        })
    }

    /// Drop the token and hide the prompt.
    pub fn clear(&self) {
        self.inner.storage.remove(keys::VERIFICATION_TOKEN);
        self.dismiss_prompt();
    }
}
