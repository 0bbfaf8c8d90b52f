//! Campus order route handlers.
//!
//! The order row and its items are separate requests. A vendor view polls
//! the live listing and moves orders along with the status route.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use campus_core::{NewOrder, NewOrderItems, Order, OrderId, OrderItem, StatusChange, VendorId};

use crate::db::OrderRepository;
use crate::db::orders::StatusUpdate;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query parameters for the live order listing.
#[derive(Debug, Deserialize)]
pub struct LiveOrdersQuery {
    pub vendor_id: VendorId,
}

/// Insert one order row.
#[instrument(skip(state, order), fields(vendor = %order.vendor_id, student = %order.student_id))]
pub async fn create(
    State(state): State<AppState>,
    Json(order): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    validate_order(&order)?;
    let created = OrderRepository::new(state.pool())
        .insert_order(&order)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Insert the item rows of one order.
#[instrument(skip(state, items), fields(order = %items.order_id))]
pub async fn create_items(
    State(state): State<AppState>,
    Json(items): Json<NewOrderItems>,
) -> Result<(StatusCode, Json<Vec<OrderItem>>)> {
    validate_items(&items)?;
    let created = OrderRepository::new(state.pool())
        .insert_items(&items)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Orders for a vendor that are still in progress, oldest first.
#[instrument(skip(state))]
pub async fn list_live(
    State(state): State<AppState>,
    Query(query): Query<LiveOrdersQuery>,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_live_for_vendor(query.vendor_id)
        .await?;
    Ok(Json(orders))
}

/// Move an order to a new status.
///
/// A step the lifecycle does not allow is a 409.
#[instrument(skip(state))]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Order>> {
    match OrderRepository::new(state.pool())
        .update_status(id, change.status)
        .await?
    {
        StatusUpdate::Applied(order) => Ok(Json(order)),
        StatusUpdate::Refused { current } => {
            warn!(current = %current, requested = %change.status, "Status change refused");
            Err(AppError::Conflict(format!(
                "Order cannot move from {current} to {}",
                change.status
            )))
        }
    }
}

fn validate_order(order: &NewOrder) -> Result<()> {
    if order.qr_code.trim().is_empty() {
        return Err(AppError::BadRequest("qr_code is required".to_string()));
    }
    if order.service_fee < Decimal::ZERO || order.total_price < order.service_fee {
        return Err(AppError::BadRequest(
            "total_price must cover a non-negative service_fee".to_string(),
        ));
    }
    Ok(())
}

fn validate_items(items: &NewOrderItems) -> Result<()> {
    if items.items.is_empty() {
        return Err(AppError::BadRequest("items must not be empty".to_string()));
    }
    for item in &items.items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        if item.unit_price < Decimal::ZERO || item.subtotal < Decimal::ZERO {
            return Err(AppError::BadRequest(format!(
                "prices for product {} must not be negative",
                item.product_id
            )));
        }
        if item.unit_price * Decimal::from(item.quantity) != item.subtotal {
            info!(product = %item.product_id, "Item subtotal does not match price times quantity");
            return Err(AppError::BadRequest(format!(
                "subtotal for product {} does not match unit_price * quantity",
                item.product_id
            )));
        }
    }
    Ok(())
}
