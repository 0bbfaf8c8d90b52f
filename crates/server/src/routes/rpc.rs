//! Registration existence checks.
//!
//! These only let the registration form show a clear message early; the
//! unique indexes remain the authority.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::instrument;

use crate::db::ProfileRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Body of `check_hall_ticket_exists`.
#[derive(Debug, Deserialize)]
pub struct HallTicketCheck {
    pub p_hall_ticket: String,
}

/// Body of `check_email_exists`.
#[derive(Debug, Deserialize)]
pub struct EmailCheck {
    pub p_email: String,
}

/// Whether any profile uses this hall ticket (case-insensitive).
#[instrument(skip_all)]
pub async fn check_hall_ticket_exists(
    State(state): State<AppState>,
    Json(body): Json<HallTicketCheck>,
) -> Result<Json<bool>> {
    let hall_ticket = non_blank(&body.p_hall_ticket, "p_hall_ticket")?;
    let exists = ProfileRepository::new(state.pool())
        .hall_ticket_exists(hall_ticket)
        .await?;
    Ok(Json(exists))
}

/// Whether any profile uses this email (case-insensitive).
#[instrument(skip_all)]
pub async fn check_email_exists(
    State(state): State<AppState>,
    Json(body): Json<EmailCheck>,
) -> Result<Json<bool>> {
    let email = non_blank(&body.p_email, "p_email")?;
    let exists = ProfileRepository::new(state.pool())
        .email_exists(email)
        .await?;
    Ok(Json(exists))
}

fn non_blank<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}
