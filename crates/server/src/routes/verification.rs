//! Order verification endpoint.
//!
//! Checks run in this order: both fields present (400), subject not locked
//! out (429), profile exists (404), then the comparison (200 or 401). The
//! 200, 401 and 429 bodies share the [`VerificationResponse`] shape.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, instrument};

use campus_core::{VerificationRequest, VerificationResponse};

use crate::db::ProfileRepository;
use crate::error::{AppError, Result};
use crate::services::VerificationDecision;
use crate::state::AppState;

const RATE_LIMITED_MESSAGE: &str = "Too many verification attempts. Please try again later.";

/// Check a verification candidate for a subject.
#[instrument(skip_all, fields(subject = tracing::field::Empty))]
pub async fn verify(
    State(state): State<AppState>,
    body: std::result::Result<Json<VerificationRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let subject = match request.user_id {
        Some(subject) if !subject.is_blank() && !request.password.is_empty() => subject,
        _ => {
            return Err(AppError::BadRequest(
                "Missing password or userId".to_string(),
            ));
        }
    };
    tracing::Span::current().record("subject", subject.as_str());

    let now = Utc::now();
    if state.verification().is_rate_limited(&subject, now) {
        return Ok(rate_limited());
    }

    let profile = ProfileRepository::new(state.pool())
        .get_by_subject(&subject)
        .await?
        .ok_or_else(|| {
            info!(subject = %subject, "Verification for subject without profile");
            AppError::NotFound("Profile".to_string())
        })?;

    let response = match state
        .verification()
        .check(&profile, &request.password, now)
    {
        VerificationDecision::Passed { token } => (
            StatusCode::OK,
            Json(VerificationResponse::passed(token.to_string())),
        )
            .into_response(),
        VerificationDecision::Rejected => (
            StatusCode::UNAUTHORIZED,
            Json(VerificationResponse::failed("Invalid password")),
        )
            .into_response(),
        VerificationDecision::RateLimited => rate_limited(),
    };
    Ok(response)
}

fn rate_limited() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(VerificationResponse::failed(RATE_LIMITED_MESSAGE)),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use campus_core::{Email, HallTicket, Profile, ProfileId, SubjectId};

    use crate::routes::{routes, test_support::offline_state};

    use super::*;

    fn request(body: &str) -> Request<Body> {
        Request::post("/functions/user-verification")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_fields_are_bad_request() {
        for body in [
            r#"{"password":"@asha1234"}"#,
            r#"{"userId":"uid-1"}"#,
            r#"{"password":"","userId":"uid-1"}"#,
            "not json",
        ] {
            let app = routes().with_state(offline_state());
            let response = app.oneshot(request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
    }

    #[tokio::test]
    async fn test_locked_out_subject_is_refused_before_lookup() {
        let state = offline_state();
        let profile = Profile {
            id: ProfileId::random(),
            subject_id: SubjectId::new("uid-1"),
            full_name: "Asha Rao".to_owned(),
            email: Email::parse("asha@college.edu").unwrap(),
            phone_number: "9876543210".to_owned(),
            department: "CSE".to_owned(),
            academic_year: "3".to_owned(),
            hall_ticket: HallTicket::parse("2023A51234").unwrap(),
            profile_picture_url: None,
            is_active: true,
            email_verified: true,
        };
        let now = Utc::now();
        for _ in 0..5 {
            state.verification().check(&profile, "wrong", now);
        }

        // The pool cannot connect, so reaching the lookup would be a 500
        let app = routes().with_state(state);
        let response = app
            .oneshot(request(r#"{"password":"@asha1234","userId":"uid-1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], RATE_LIMITED_MESSAGE);
        assert!(body.get("verificationToken").is_none());
    }
}
