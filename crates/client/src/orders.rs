//! Order composer: one order row plus its item rows per vendor group.
//!
//! Groups are placed one after another. The order row and its items are two
//! separate writes with no transaction around them, so every failure is
//! reported against the vendor group it happened in:
//!
//! - groups before the failure stay committed
//! - the failing group is reported as "order not created", "order created
//!   without items", or "outcome unknown" when the order insert may have
//!   landed before the error
//! - groups after it are not attempted
//!
//! Nothing is retried: a retry after an order insert that actually landed
//! would create a duplicate order.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use campus_core::{
    NewOrder, NewOrderItem, NewOrderItems, Order, OrderId, OrderItem, PaymentMethod, ProfileId,
    VendorId, round_money, split_money,
};

use crate::backend::OrderStore;
use crate::cart::{Cart, VendorGroup};
use crate::profile::ProfileError;

/// Checkout choices that apply to every vendor order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    /// Service fee for the whole cart, split equally across vendor groups.
    /// Cents lost to the split are billed on the last group.
    pub service_fee: Decimal,
}

/// One vendor group that was fully written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// How a vendor group failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupFailure {
    /// The order row was not written.
    OrderNotCreated { vendor_id: VendorId, reason: String },
    /// The order insert failed after the request went out; the row may exist.
    OutcomeUnknown { vendor_id: VendorId, reason: String },
    /// The order row exists but its items were not written.
    ItemsMissing {
        vendor_id: VendorId,
        order_id: OrderId,
        reason: String,
    },
}

impl GroupFailure {
    #[must_use]
    pub const fn vendor_id(&self) -> VendorId {
        match self {
            Self::OrderNotCreated { vendor_id, .. }
            | Self::OutcomeUnknown { vendor_id, .. }
            | Self::ItemsMissing { vendor_id, .. } => *vendor_id,
        }
    }
}

/// Per-group account of a placement that did not fully succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementReport {
    /// Groups committed before the failure.
    pub committed: Vec<PlacedOrder>,
    /// The group that failed.
    pub failed: GroupFailure,
    /// Groups after the failure, never attempted.
    pub not_attempted: Vec<VendorId>,
}

/// Reasons an order placement did not complete.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("please sign in to place an order")]
    NotSignedIn,

    #[error("could not find your profile - please log out and back in")]
    ProfileMissing,

    #[error("failed to load your profile, please retry")]
    ProfileUnavailable(#[source] ProfileError),

    #[error("please verify before placing an order")]
    VerificationRequired,

    #[error("your cart is empty")]
    EmptyCart,

    #[error("invalid quantity for {product}")]
    InvalidQuantity { product: String },

    /// An order row was written but its items were not.
    #[error("order created but incomplete - contact support")]
    ItemsMissing(Box<PlacementReport>),

    /// A vendor group failed before its order row was written.
    #[error("order for one of your vendors could not be placed")]
    VendorGroupFailed(Box<PlacementReport>),

    /// An order insert may or may not have landed.
    #[error("order status unknown - contact support before ordering again")]
    OrderOutcomeUnknown(Box<PlacementReport>),
}

impl PlacementError {
    /// The per-group report, if any group was attempted.
    #[must_use]
    pub fn report(&self) -> Option<&PlacementReport> {
        match self {
            Self::ItemsMissing(report)
            | Self::VendorGroupFailed(report)
            | Self::OrderOutcomeUnknown(report) => Some(report),
            _ => None,
        }
    }
}

/// Every vendor group was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementReceipt {
    pub orders: Vec<PlacedOrder>,
}

impl PlacementReceipt {
    /// Single confirmation naming how many vendor orders were created.
    #[must_use]
    pub fn message(&self) -> String {
        match self.orders.len() {
            1 => "Order placed successfully!".to_owned(),
            n => format!("Order placed successfully with {n} vendors!"),
        }
    }
}

/// Writes one order per vendor group.
pub struct OrderComposer<S> {
    store: Arc<S>,
    pickup_window: chrono::Duration,
}

impl<S> Clone for OrderComposer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pickup_window: self.pickup_window,
        }
    }
}

impl<S: OrderStore> OrderComposer<S> {
    #[must_use]
    pub const fn new(store: Arc<S>, pickup_window: chrono::Duration) -> Self {
        Self {
            store,
            pickup_window,
        }
    }

    /// Place the cart's vendor groups in order for `student`.
    ///
    /// Clears the cart on full success. On partial failure, removes the
    /// lines of every vendor whose order row was written so the remaining
    /// cart can be resubmitted without duplicating those orders.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` / `InvalidQuantity` before anything is written
    /// - `VendorGroupFailed` if an order insert was refused
    /// - `OrderOutcomeUnknown` if an order insert failed in a way that may
    ///   still have written the row
    /// - `ItemsMissing` if an order was written without its items
    #[instrument(skip(self, cart, checkout), fields(student = %student, lines = cart.lines().len()))]
    pub async fn place(
        &self,
        student: ProfileId,
        cart: &mut Cart,
        checkout: &Checkout,
    ) -> Result<PlacementReceipt, PlacementError> {
        let groups = cart.vendor_groups();
        if groups.is_empty() {
            return Err(PlacementError::EmptyCart);
        }
        let prepared = groups
            .iter()
            .map(prepare_items)
            .collect::<Result<Vec<_>, _>>()?;

        let fees = split_money(checkout.service_fee, groups.len());

        let mut committed: Vec<PlacedOrder> = Vec::with_capacity(groups.len());
        for (index, ((group, items), service_fee)) in
            groups.iter().zip(prepared).zip(fees).enumerate()
        {
            let not_attempted = || {
                groups
                    .iter()
                    .skip(index + 1)
                    .map(|g| g.vendor_id)
                    .collect::<Vec<_>>()
            };

            let new_order = NewOrder {
                student_id: student,
                vendor_id: group.vendor_id,
                total_price: round_money(group.subtotal() + service_fee),
                service_fee,
                payment_method: checkout.payment_method,
                qr_code: pickup_code(),
                notes: checkout.notes.clone(),
                pickup_deadline: Utc::now() + self.pickup_window,
            };

            let order = match self.store.insert_order(&new_order).await {
                Ok(order) => order,
                Err(e) if e.may_have_applied() => {
                    error!(
                        vendor = %group.vendor_id,
                        error = %e,
                        "Order insert outcome unknown, needs manual follow-up"
                    );
                    let report = PlacementReport {
                        committed,
                        failed: GroupFailure::OutcomeUnknown {
                            vendor_id: group.vendor_id,
                            reason: e.to_string(),
                        },
                        not_attempted: not_attempted(),
                    };
                    forget_committed(cart, &report);
                    return Err(PlacementError::OrderOutcomeUnknown(Box::new(report)));
                }
                Err(e) => {
                    warn!(vendor = %group.vendor_id, error = %e, "Order insert failed");
                    let report = PlacementReport {
                        committed,
                        failed: GroupFailure::OrderNotCreated {
                            vendor_id: group.vendor_id,
                            reason: e.to_string(),
                        },
                        not_attempted: not_attempted(),
                    };
                    forget_committed(cart, &report);
                    return Err(PlacementError::VendorGroupFailed(Box::new(report)));
                }
            };

            let rows = NewOrderItems {
                order_id: order.id,
                items,
            };
            match self.store.insert_items(&rows).await {
                Ok(items) => {
                    info!(vendor = %group.vendor_id, order = %order.id, "Vendor order placed");
                    committed.push(PlacedOrder { order, items });
                }
                Err(e) => {
                    error!(
                        vendor = %group.vendor_id,
                        order = %order.id,
                        error = %e,
                        "Order row written without items, needs manual follow-up"
                    );
                    let report = PlacementReport {
                        committed,
                        failed: GroupFailure::ItemsMissing {
                            vendor_id: group.vendor_id,
                            order_id: order.id,
                            reason: e.to_string(),
                        },
                        not_attempted: not_attempted(),
                    };
                    forget_committed(cart, &report);
                    return Err(PlacementError::ItemsMissing(Box::new(report)));
                }
            }
        }

        cart.clear();
        info!(orders = committed.len(), "Checkout complete");
        Ok(PlacementReceipt { orders: committed })
    }
}

fn prepare_items(group: &VendorGroup) -> Result<Vec<NewOrderItem>, PlacementError> {
    group
        .lines
        .iter()
        .map(|line| {
            let quantity = i32::try_from(line.quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| PlacementError::InvalidQuantity {
                    product: line.name.clone(),
                })?;
            Ok(NewOrderItem {
                product_id: line.product_id,
                quantity,
                unit_price: line.discounted_unit_price(),
                subtotal: line.subtotal(),
            })
        })
        .collect()
}

/// Opaque, globally unique pickup code.
fn pickup_code() -> String {
    format!("ORDER_{}", Uuid::new_v4().simple())
}

/// Drop cart lines for every vendor that has, or may have, an order row.
fn forget_committed(cart: &mut Cart, report: &PlacementReport) {
    for placed in &report.committed {
        cart.remove_vendor(placed.order.vendor_id);
    }
    match report.failed {
        GroupFailure::ItemsMissing { vendor_id, .. }
        | GroupFailure::OutcomeUnknown { vendor_id, .. } => cart.remove_vendor(vendor_id),
        GroupFailure::OrderNotCreated { .. } => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use campus_core::{OrderItemId, OrderStatus, ProductId};

    use super::*;
    use crate::backend::BackendError;
    use crate::cart::CartLine;

    #[derive(Default)]
    struct RecordingStore {
        orders: Mutex<Vec<NewOrder>>,
        item_writes: Mutex<Vec<NewOrderItems>>,
        fail_order_for: Option<VendorId>,
        time_out_order_for: Option<VendorId>,
        fail_items_for: Option<VendorId>,
    }

    impl OrderStore for RecordingStore {
        async fn insert_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
            if self.fail_order_for == Some(order.vendor_id) {
                return Err(BackendError::Unavailable("insert failed".to_owned()));
            }
            if self.time_out_order_for == Some(order.vendor_id) {
                return Err(BackendError::Timeout);
            }
            self.orders.lock().unwrap().push(order.clone());
            Ok(Order {
                id: OrderId::random(),
                student_id: order.student_id,
                vendor_id: order.vendor_id,
                total_price: order.total_price,
                service_fee: order.service_fee,
                payment_method: order.payment_method,
                qr_code: order.qr_code.clone(),
                notes: order.notes.clone(),
                pickup_deadline: order.pickup_deadline,
                status: OrderStatus::Placed,
                created_at: Utc::now(),
            })
        }

        async fn insert_items(&self, items: &NewOrderItems) -> Result<Vec<OrderItem>, BackendError> {
            let vendor = self
                .orders
                .lock()
                .unwrap()
                .last()
                .map(|o| o.vendor_id)
                .unwrap();
            if self.fail_items_for == Some(vendor) {
                return Err(BackendError::Timeout);
            }
            self.item_writes.lock().unwrap().push(items.clone());
            Ok(items
                .items
                .iter()
                .map(|item| OrderItem {
                    id: OrderItemId::random(),
                    order_id: items.order_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    subtotal: item.subtotal,
                })
                .collect())
        }
    }

    fn line(vendor: VendorId, price: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::random(),
            name: "Veg Biryani".to_owned(),
            unit_price: Decimal::from(price),
            discount_percentage: Decimal::ZERO,
            quantity,
            vendor_id: vendor,
        }
    }

    fn checkout(fee: i64) -> Checkout {
        Checkout {
            payment_method: PaymentMethod::Upi,
            notes: None,
            service_fee: Decimal::from(fee),
        }
    }

    fn composer(store: RecordingStore) -> (OrderComposer<RecordingStore>, Arc<RecordingStore>) {
        let store = Arc::new(store);
        (
            OrderComposer::new(Arc::clone(&store), chrono::Duration::minutes(30)),
            store,
        )
    }

    #[tokio::test]
    async fn test_fee_is_split_equally() {
        let x = VendorId::random();
        let y = VendorId::random();
        let mut cart = Cart::new();
        cart.add(line(x, 30, 1));
        cart.add(line(y, 10, 1));

        let (composer, _) = composer(RecordingStore::default());
        let receipt = composer
            .place(ProfileId::random(), &mut cart, &checkout(4))
            .await
            .unwrap();

        assert_eq!(receipt.orders.len(), 2);
        let fees: Vec<_> = receipt.orders.iter().map(|p| p.order.service_fee).collect();
        assert_eq!(fees, vec![Decimal::from(2), Decimal::from(2)]);
        assert_eq!(receipt.orders[0].order.total_price, Decimal::from(32));
        assert_eq!(receipt.orders[1].order.total_price, Decimal::from(12));
        assert!(cart.is_empty());
        assert_eq!(receipt.message(), "Order placed successfully with 2 vendors!");
    }

    #[tokio::test]
    async fn test_pickup_deadline_and_codes() {
        let mut cart = Cart::new();
        cart.add(line(VendorId::random(), 30, 1));
        cart.add(line(VendorId::random(), 10, 1));

        let before = Utc::now();
        let (composer, store) = composer(RecordingStore::default());
        composer
            .place(ProfileId::random(), &mut cart, &checkout(0))
            .await
            .unwrap();

        let orders = store.orders.lock().unwrap();
        assert_ne!(orders[0].qr_code, orders[1].qr_code);
        for order in orders.iter() {
            assert!(order.qr_code.starts_with("ORDER_"));
            assert!(order.pickup_deadline >= before + chrono::Duration::minutes(30));
        }
    }

    #[tokio::test]
    async fn test_second_group_order_failure_keeps_first() {
        let x = VendorId::random();
        let y = VendorId::random();
        let mut cart = Cart::new();
        cart.add(line(x, 30, 1));
        cart.add(line(y, 10, 1));

        let (composer, store) = composer(RecordingStore {
            fail_order_for: Some(y),
            ..RecordingStore::default()
        });
        let err = composer
            .place(ProfileId::random(), &mut cart, &checkout(4))
            .await
            .unwrap_err();

        let PlacementError::VendorGroupFailed(report) = err else {
            panic!("expected a vendor group failure");
        };
        assert_eq!(report.committed.len(), 1);
        assert_eq!(report.committed[0].order.vendor_id, x);
        assert_eq!(report.failed.vendor_id(), y);
        assert!(report.not_attempted.is_empty());
        assert_eq!(store.orders.lock().unwrap().len(), 1);

        // Only the failed vendor's lines remain for a resubmit
        assert_eq!(cart.vendor_groups().len(), 1);
        assert_eq!(cart.lines()[0].vendor_id, y);
    }

    #[tokio::test]
    async fn test_items_failure_is_distinct_and_stops() {
        let x = VendorId::random();
        let y = VendorId::random();
        let mut cart = Cart::new();
        cart.add(line(x, 30, 1));
        cart.add(line(y, 10, 1));

        let (composer, store) = composer(RecordingStore {
            fail_items_for: Some(x),
            ..RecordingStore::default()
        });
        let err = composer
            .place(ProfileId::random(), &mut cart, &checkout(4))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "order created but incomplete - contact support");
        let report = err.report().unwrap();
        assert!(report.committed.is_empty());
        assert!(matches!(report.failed, GroupFailure::ItemsMissing { vendor_id, .. } if vendor_id == x));
        assert_eq!(report.not_attempted, vec![y]);
        assert_eq!(store.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_order_insert_is_not_offered_again() {
        let x = VendorId::random();
        let y = VendorId::random();
        let mut cart = Cart::new();
        cart.add(line(x, 30, 1));
        cart.add(line(y, 10, 1));

        let (composer, _) = composer(RecordingStore {
            time_out_order_for: Some(x),
            ..RecordingStore::default()
        });
        let err = composer
            .place(ProfileId::random(), &mut cart, &checkout(4))
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::OrderOutcomeUnknown(_)));
        assert!(err.to_string().contains("contact support"));
        let report = err.report().unwrap();
        assert!(matches!(report.failed, GroupFailure::OutcomeUnknown { vendor_id, .. } if vendor_id == x));
        assert_eq!(report.not_attempted, vec![y]);

        // Resubmitting must not place a second order for x
        assert!(cart.lines().iter().all(|l| l.vendor_id == y));
    }

    #[tokio::test]
    async fn test_fee_remainder_is_billed_once() {
        let mut cart = Cart::new();
        cart.add(line(VendorId::random(), 10, 1));
        cart.add(line(VendorId::random(), 10, 1));
        cart.add(line(VendorId::random(), 10, 1));

        let (composer, _) = composer(RecordingStore::default());
        let checkout = Checkout {
            service_fee: Decimal::ONE,
            ..checkout(0)
        };
        let receipt = composer
            .place(ProfileId::random(), &mut cart, &checkout)
            .await
            .unwrap();

        let fees: Vec<_> = receipt.orders.iter().map(|p| p.order.service_fee).collect();
        assert_eq!(
            fees,
            vec![Decimal::new(33, 2), Decimal::new(33, 2), Decimal::new(34, 2)]
        );
        assert_eq!(fees.iter().sum::<Decimal>(), Decimal::ONE);
    }

    #[tokio::test]
    async fn test_empty_cart_writes_nothing() {
        let (composer, store) = composer(RecordingStore::default());
        let err = composer
            .place(ProfileId::random(), &mut Cart::new(), &checkout(0))
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::EmptyCart));
        assert!(store.orders.lock().unwrap().is_empty());
    }
}
