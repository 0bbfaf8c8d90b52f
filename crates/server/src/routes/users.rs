//! Profile route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, instrument};

use campus_core::{NewProfile, Profile, ProfileChanges, ProfileId, SubjectId};

use crate::db::ProfileRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Profile belonging to a subject, 404 if none.
#[instrument(skip(state), fields(subject = %subject))]
pub async fn show(
    State(state): State<AppState>,
    Path(subject): Path<SubjectId>,
) -> Result<Json<Profile>> {
    ProfileRepository::new(state.pool())
        .get_by_subject(&subject)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Profile".to_string()))
}

/// Create a profile.
///
/// Uniqueness of subject, email and hall ticket is enforced by the store and
/// surfaces as 409.
#[instrument(skip(state, profile), fields(subject = %profile.subject_id))]
pub async fn create(
    State(state): State<AppState>,
    Json(profile): Json<NewProfile>,
) -> Result<(StatusCode, Json<Profile>)> {
    if profile.subject_id.is_blank() {
        return Err(AppError::BadRequest("subject_id is required".to_string()));
    }
    if profile.full_name.trim().is_empty() {
        return Err(AppError::BadRequest("full_name is required".to_string()));
    }

    let created = ProfileRepository::new(state.pool()).create(&profile).await?;
    info!(profile = %created.id, "Profile created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Apply a partial edit.
#[instrument(skip(state, changes))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
    Json(changes): Json<ProfileChanges>,
) -> Result<Json<Profile>> {
    if changes
        .full_name
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(AppError::BadRequest("full_name cannot be blank".to_string()));
    }

    let updated = ProfileRepository::new(state.pool())
        .update(id, &changes)
        .await?;
    Ok(Json(updated))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::routes::{routes, test_support::offline_state};

    use super::*;

    #[tokio::test]
    async fn test_patch_with_bad_id_is_rejected() {
        let app = routes().with_state(offline_state());
        let response = app
            .oneshot(
                Request::patch("/rest/users/not-a-uuid")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blank_name_edit_is_rejected() {
        let app = routes().with_state(offline_state());
        let uri = format!("/rest/users/{}", ProfileId::random());
        let response = app
            .oneshot(
                Request::patch(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"full_name":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_with_invalid_hall_ticket_is_unprocessable() {
        let app = routes().with_state(offline_state());
        let body = serde_json::json!({
            "subject_id": "uid-1",
            "full_name": "Asha Rao",
            "email": "asha@college.edu",
            "phone_number": "9876543210",
            "department": "CSE",
            "academic_year": "3",
            "hall_ticket": "12"
        });
        let response = app
            .oneshot(
                Request::post("/rest/users")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
