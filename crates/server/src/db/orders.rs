//! Campus order repository.
//!
//! An order row and its item rows arrive in two separate requests, and
//! nothing here ties them together. The items of one request are written
//! in a single transaction so a request never leaves half its items.

use sqlx::PgPool;
use tracing::{info, instrument};

use campus_core::{NewOrder, NewOrderItems, Order, OrderId, OrderItem, OrderStatus, VendorId};

use super::RepositoryError;

const ORDER_COLUMNS: &str = "id, student_id, vendor_id, total_price, service_fee, \
     payment_method, qr_code, notes, pickup_deadline, status, created_at";

/// Outcome of a requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The order moved to the requested status.
    Applied(Order),
    /// The order's current status does not allow the requested step.
    Refused { current: OrderStatus },
}

/// Repository for `campus_orders` and `campus_order_items`.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert one order row in the `placed` status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the student or vendor does not
    /// exist, or the pickup code is already in use.
    #[instrument(skip(self, order), fields(vendor = %order.vendor_id, student = %order.student_id))]
    pub async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let sql = format!(
            "INSERT INTO campus_orders (student_id, vendor_id, total_price, service_fee, \
             payment_method, qr_code, notes, pickup_deadline) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order.student_id)
            .bind(order.vendor_id)
            .bind(order.total_price)
            .bind(order.service_fee)
            .bind(order.payment_method)
            .bind(&order.qr_code)
            .bind(order.notes.as_deref())
            .bind(order.pickup_deadline)
            .fetch_one(self.pool)
            .await
            .map_err(RepositoryError::from_write)?;

        info!(order = %order.id, "Order row inserted");
        Ok(order)
    }

    /// Insert the item rows of one order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order or a product does
    /// not exist. No item is written in that case.
    #[instrument(skip(self, items), fields(order = %items.order_id, count = items.items.len()))]
    pub async fn insert_items(&self, items: &NewOrderItems) -> Result<Vec<OrderItem>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(items.items.len());

        for item in &items.items {
            let row = sqlx::query_as::<_, OrderItem>(
                "INSERT INTO campus_order_items (order_id, product_id, quantity, unit_price, subtotal) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, order_id, product_id, quantity, unit_price, subtotal",
            )
            .bind(items.order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from_write)?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    /// Orders for a vendor that are still in progress, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_live_for_vendor(
        &self,
        vendor_id: VendorId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM campus_orders \
             WHERE vendor_id = $1 AND status IN ('placed', 'accepted', 'ready') \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(vendor_id)
            .fetch_all(self.pool)
            .await
            .map_err(RepositoryError::from_write)
    }

    /// Move an order to `next` if its current status allows it.
    ///
    /// The row is locked while the transition is checked, so two concurrent
    /// changes cannot both apply from the same starting status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<StatusUpdate, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: OrderStatus =
            sqlx::query_scalar("SELECT status FROM campus_orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        if !current.can_transition_to(next) {
            return Ok(StatusUpdate::Refused { current });
        }

        let sql = format!(
            "UPDATE campus_orders SET status = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(next)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(from = %current, to = %next, "Order status changed");
        Ok(StatusUpdate::Applied(order))
    }
}
