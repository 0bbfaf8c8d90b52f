//! Campus order and order item rows.
//!
//! An order belongs to exactly one vendor. Its items are written separately
//! from the order row itself, so an order can exist without items if the
//! second write fails.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, ProfileId, VendorId};

/// Order row as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub student_id: ProfileId,
    pub vendor_id: VendorId,
    /// Vendor subtotal plus this order's share of the service fee.
    pub total_price: Decimal,
    pub service_fee: Decimal,
    pub payment_method: PaymentMethod,
    /// Opaque pickup code shown to the vendor as a QR code.
    pub qr_code: String,
    pub notes: Option<String>,
    pub pickup_deadline: DateTime<Utc>,
}

/// Order row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Order {
    pub id: OrderId,
    pub student_id: ProfileId,
    pub vendor_id: VendorId,
    pub total_price: Decimal,
    pub service_fee: Decimal,
    pub payment_method: PaymentMethod,
    pub qr_code: String,
    pub notes: Option<String>,
    pub pickup_deadline: DateTime<Utc>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// One line of an order as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price after discount.
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// The item rows of a single order, written in one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItems {
    pub order_id: OrderId,
    pub items: Vec<NewOrderItem>,
}

/// Order item row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Request body for a vendor moving an order along its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}
