//! HTTP implementation of the backing-service traits.
//!
//! Talks JSON to `campus-server`. Every request carries the configured
//! timeout, so no call can leave a caller waiting indefinitely.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use campus_core::{
    NewOrder, NewOrderItems, NewProfile, Order, OrderItem, Profile, ProfileChanges, ProfileId,
    SubjectId, VerificationRequest, VerificationResponse,
};

use super::{
    BackendError, OrderStore, ProfileDirectory, VerificationEndpoint, VerificationReply,
};
use crate::config::ClientConfig;

const RATE_LIMITED_MESSAGE: &str = "Too many verification attempts. Please try again later.";

/// Client for the campus backing service.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestBackendInner>,
}

struct RestBackendInner {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.inner.base_url.as_str())
            .field("api_key", &self.inner.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RestBackend {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(RestBackendInner {
                client,
                base_url: config.api_url.clone(),
                api_key: config.api_key.clone(),
            }),
        })
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Unavailable("API URL cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match &self.inner.api_key {
            Some(key) => builder.header("apikey", key.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and decode a JSON body, mapping error statuses.
    async fn send_json<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let text = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse backing service response"
            );
            BackendError::Parse(e)
        })
    }
}

impl ProfileDirectory for RestBackend {
    #[instrument(skip(self), fields(subject = %subject))]
    async fn fetch_profile(&self, subject: &SubjectId) -> Result<Option<Profile>, BackendError> {
        match self
            .send_json::<(), Profile>(Method::GET, &["rest", "users", subject.as_str()], None)
            .await
        {
            Ok(profile) => Ok(Some(profile)),
            Err(BackendError::NotFound) => {
                debug!("No profile row for subject");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, profile), fields(subject = %profile.subject_id))]
    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile, BackendError> {
        self.send_json(Method::POST, &["rest", "users"], Some(profile))
            .await
    }

    #[instrument(skip(self, changes))]
    async fn update_profile(
        &self,
        id: ProfileId,
        changes: &ProfileChanges,
    ) -> Result<Profile, BackendError> {
        let id = id.to_string();
        self.send_json(Method::PATCH, &["rest", "users", &id], Some(changes))
            .await
    }

    async fn hall_ticket_exists(&self, hall_ticket: &str) -> Result<bool, BackendError> {
        let body = serde_json::json!({ "p_hall_ticket": hall_ticket });
        self.send_json(
            Method::POST,
            &["rpc", "check_hall_ticket_exists"],
            Some(&body),
        )
        .await
    }

    async fn email_exists(&self, email: &str) -> Result<bool, BackendError> {
        let body = serde_json::json!({ "p_email": email });
        self.send_json(Method::POST, &["rpc", "check_email_exists"], Some(&body))
            .await
    }
}

impl VerificationEndpoint for RestBackend {
    #[instrument(skip(self, candidate), fields(subject = %subject))]
    async fn verify(
        &self,
        candidate: &str,
        subject: &SubjectId,
    ) -> Result<VerificationReply, BackendError> {
        let request = VerificationRequest {
            password: candidate.to_owned(),
            user_id: Some(subject.clone()),
        };
        let url = self.endpoint(&["functions", "user-verification"])?;
        let response = self
            .request(Method::POST, url)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                // The per-IP limiter answers in plain text, the per-subject one in JSON
                let text = response.text().await.unwrap_or_default();
                let error = serde_json::from_str::<VerificationResponse>(&text)
                    .ok()
                    .and_then(|body| body.error)
                    .unwrap_or_else(|| RATE_LIMITED_MESSAGE.to_owned());
                Ok(VerificationReply::RateLimited { error })
            }
            StatusCode::OK | StatusCode::UNAUTHORIZED => {
                let text = response.text().await.map_err(map_transport_error)?;
                let body: VerificationResponse = serde_json::from_str(&text)?;
                Ok(match (status, body.success, body.verification_token) {
                    (StatusCode::OK, true, Some(token)) => VerificationReply::Passed { token },
                    _ => VerificationReply::Failed {
                        error: body
                            .error
                            .unwrap_or_else(|| "Verification failed".to_owned()),
                    },
                })
            }
            _ => Err(error_from_response(response).await),
        }
    }
}

impl OrderStore for RestBackend {
    #[instrument(skip(self, order), fields(vendor = %order.vendor_id))]
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
        self.send_json(Method::POST, &["rest", "campus_orders"], Some(order))
            .await
    }

    #[instrument(skip(self, items), fields(order = %items.order_id, count = items.items.len()))]
    async fn insert_items(&self, items: &NewOrderItems) -> Result<Vec<OrderItem>, BackendError> {
        self.send_json(Method::POST, &["rest", "campus_order_items"], Some(items))
            .await
    }
}

// =============================================================================
// Response Mapping
// =============================================================================

fn map_transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Http(e)
    }
}

/// Turn a non-success response into the matching error.
async fn error_from_response(response: Response) -> BackendError {
    let status = response.status();
    let message = response
        .text()
        .await
        .map(|text| extract_error_message(&text))
        .unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound,
        StatusCode::CONFLICT => BackendError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BackendError::Timeout,
        s if s.is_server_error() => {
            warn!(status = %s, message = %message, "Backing service error");
            BackendError::Unavailable(message)
        }
        s => BackendError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

/// Pull `error` out of a JSON error body, falling back to the raw text.
fn extract_error_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| text.chars().take(200).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend(base: &str) -> RestBackend {
        RestBackend::new(&ClientConfig::new(Url::parse(base).unwrap())).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let backend = backend("http://localhost:3000/");
        let url = backend
            .endpoint(&["rest", "users", "uid with/slash"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/rest/users/uid%20with%2Fslash"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = backend("https://api.campus.test/v1");
        let url = backend.endpoint(&["rpc", "check_email_exists"]).unwrap();
        assert_eq!(url.as_str(), "https://api.campus.test/v1/rpc/check_email_exists");
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":"Hall ticket already registered"}"#),
            "Hall ticket already registered"
        );
        assert_eq!(extract_error_message("plain text"), "plain text");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = ClientConfig::new(Url::parse("http://localhost:3000").unwrap());
        config.api_key = Some(SecretString::from("anon-key-value"));
        let backend = RestBackend::new(&config).unwrap();
        let debug_output = format!("{backend:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("anon-key-value"));
    }
}
