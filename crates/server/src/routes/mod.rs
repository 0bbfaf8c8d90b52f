//! HTTP route handlers for the backing service.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                          - Liveness check
//! GET   /health/ready                    - Database connectivity
//!
//! # Profiles
//! GET   /rest/users/{subject}            - Profile by identity provider subject
//! POST  /rest/users                      - Create profile (409 on unique clash)
//! PATCH /rest/users/{id}                 - Partial profile edit
//!
//! # Registration checks
//! POST  /rpc/check_hall_ticket_exists    - {p_hall_ticket} -> bool
//! POST  /rpc/check_email_exists          - {p_email} -> bool
//!
//! # Verification (IP rate limited)
//! POST  /functions/user-verification     - {password, userId} -> result
//!
//! # Orders
//! POST  /rest/campus_orders              - Insert one order row
//! GET   /rest/campus_orders?vendor_id=   - Live orders for a vendor
//! PATCH /rest/campus_orders/{id}/status  - Move an order along its lifecycle
//! POST  /rest/campus_order_items         - Insert the items of one order
//! ```

pub mod orders;
pub mod rpc;
pub mod users;
pub mod verification;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
};

use crate::middleware::verification_rate_limiter;
use crate::state::AppState;

/// Create the profile routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(users::create))
        // GET takes a subject, PATCH a profile id
        .route("/users/{key}", get(users::show).patch(users::update))
}

/// Create the registration check routes router.
pub fn rpc_routes() -> Router<AppState> {
    Router::new()
        .route("/check_hall_ticket_exists", post(rpc::check_hall_ticket_exists))
        .route("/check_email_exists", post(rpc::check_email_exists))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/campus_orders", post(orders::create).get(orders::list_live))
        .route("/campus_orders/{id}/status", patch(orders::update_status))
        .route("/campus_order_items", post(orders::create_items))
}

/// Create the verification routes router.
pub fn verification_routes() -> Router<AppState> {
    Router::new()
        .route("/user-verification", post(verification::verify))
        .layer(verification_rate_limiter())
}

/// Create all routes for the backing service.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/rest", user_routes().merge(order_routes()))
        .nest("/rpc", rpc_routes())
        .nest("/functions", verification_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_health() {
        let app = routes().with_state(test_support::offline_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_reports_unreachable_database() {
        let app = routes().with_state(test_support::offline_state());
        let response = app
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = routes().with_state(test_support::offline_state());
        let response = app
            .oneshot(Request::get("/rest/products").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
