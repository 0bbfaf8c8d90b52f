//! Integration test support for Campus Connect.
//!
//! The client core is exercised end to end against in-memory collaborators:
//!
//! - [`FakeIdentity`] - identity provider holding at most one session
//! - [`FakeBackend`] - profile directory, verification endpoint and order
//!   store in one; verification runs the server's real
//!   [`campus_server::services::VerificationService`]
//!
//! Fetches can be held open per subject with [`FakeBackend::hold_fetch`], and
//! verification replies with [`FakeBackend::hold_verify`], to stage races.
//! Writes can be made to fail per vendor.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p campus-integration-tests
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;

use campus_client::backend::{
    BackendError, IdentityError, IdentityProvider, OrderStore, ProfileDirectory,
    VerificationEndpoint, VerificationReply,
};
use campus_client::cart::CartLine;
use campus_client::config::ClientConfig;
use campus_client::models::Session;
use campus_client::CampusClient;
use campus_core::{
    Email, HallTicket, NewOrder, NewOrderItems, NewProfile, Order, OrderId, OrderItem,
    OrderItemId, OrderStatus, ProductId, Profile, ProfileChanges, ProfileId, SubjectId, VendorId,
};
use campus_server::config::VerificationLimits;
use campus_server::services::{VerificationDecision, VerificationService};

/// Client wired to the in-memory collaborators.
pub type TestClient = CampusClient<FakeBackend, FakeIdentity>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Fixtures
// =============================================================================

/// A live session for `subject` that expires in an hour.
///
/// # Panics
///
/// Never; the email literal is valid.
#[must_use]
pub fn session(subject: &str, email_verified: bool) -> Session {
    let now = Utc::now();
    Session {
        subject_id: SubjectId::new(subject),
        email: Email::parse(&format!("{subject}@college.edu")).expect("fixture email is valid"),
        email_verified,
        issued_at: now,
        expires_at: now + Duration::hours(1),
    }
}

/// A profile row for `subject`.
///
/// # Panics
///
/// If `hall_ticket` is not a valid hall ticket.
#[must_use]
pub fn profile(subject: &str, full_name: &str, hall_ticket: &str) -> Profile {
    Profile {
        id: ProfileId::random(),
        subject_id: SubjectId::new(subject),
        full_name: full_name.to_owned(),
        email: Email::parse(&format!("{subject}@college.edu")).expect("fixture email is valid"),
        phone_number: "9876543210".to_owned(),
        department: "CSE".to_owned(),
        academic_year: "3".to_owned(),
        hall_ticket: HallTicket::parse(hall_ticket).expect("fixture hall ticket is valid"),
        profile_picture_url: None,
        is_active: true,
        email_verified: true,
    }
}

/// A cart line of `quantity` items at `price` each, no discount.
#[must_use]
pub fn line(vendor_id: VendorId, name: &str, price: i64, quantity: u32) -> CartLine {
    CartLine {
        product_id: ProductId::random(),
        name: name.to_owned(),
        unit_price: Decimal::from(price),
        discount_percentage: Decimal::ZERO,
        quantity,
        vendor_id,
    }
}

/// Client configuration pointing nowhere; the fakes never use the URL.
///
/// # Panics
///
/// Never; the URL literal is valid.
#[must_use]
pub fn config() -> ClientConfig {
    ClientConfig::new(url::Url::parse("http://localhost:3000").expect("fixture URL is valid"))
}

/// Client whose provider starts with `session`, bootstrapped.
pub async fn client(backend: &FakeBackend, session: Option<Session>) -> TestClient {
    let client = CampusClient::new(config(), backend.clone(), FakeIdentity::new(session));
    client.bootstrap().await;
    client
}

/// Yield until `condition` holds.
///
/// # Panics
///
/// If the condition does not hold after many scheduler turns.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

// =============================================================================
// Identity Provider
// =============================================================================

/// In-memory identity provider.
#[derive(Clone, Default)]
pub struct FakeIdentity {
    inner: Arc<FakeIdentityInner>,
}

#[derive(Default)]
struct FakeIdentityInner {
    session: Mutex<Option<Session>>,
    fail_sign_out: Mutex<bool>,
    sign_outs: AtomicUsize,
}

impl FakeIdentity {
    #[must_use]
    pub fn new(session: Option<Session>) -> Self {
        let identity = Self::default();
        *lock(&identity.inner.session) = session;
        identity
    }

    /// Make the next sign-outs fail on the provider side.
    pub fn fail_sign_out(&self, fail: bool) {
        *lock(&self.inner.fail_sign_out) = fail;
    }

    #[must_use]
    pub fn sign_outs(&self) -> usize {
        self.inner.sign_outs.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FakeIdentity {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        Ok(lock(&self.inner.session).clone())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.inner.sign_outs.fetch_add(1, Ordering::SeqCst);
        if *lock(&self.inner.fail_sign_out) {
            return Err(IdentityError::Unavailable("provider offline".to_owned()));
        }
        *lock(&self.inner.session) = None;
        Ok(())
    }
}

// =============================================================================
// Backing Service
// =============================================================================

/// In-memory backing service.
#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<FakeBackendInner>,
}

struct FakeBackendInner {
    profiles: Mutex<HashMap<SubjectId, Profile>>,
    held_fetches: Mutex<HashMap<SubjectId, Arc<Notify>>>,
    failing_fetches: Mutex<HashSet<SubjectId>>,
    fetches: AtomicUsize,
    verification: VerificationService,
    verify_calls: AtomicUsize,
    held_verify: Mutex<Option<Arc<Notify>>>,
    orders: Mutex<Vec<Order>>,
    items: Mutex<Vec<OrderItem>>,
    failing_orders: Mutex<HashSet<VendorId>>,
    failing_items: Mutex<HashSet<VendorId>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeBackendInner {
                profiles: Mutex::new(HashMap::new()),
                held_fetches: Mutex::new(HashMap::new()),
                failing_fetches: Mutex::new(HashSet::new()),
                fetches: AtomicUsize::new(0),
                verification: VerificationService::new(VerificationLimits::default()),
                verify_calls: AtomicUsize::new(0),
                held_verify: Mutex::new(None),
                orders: Mutex::new(Vec::new()),
                items: Mutex::new(Vec::new()),
                failing_orders: Mutex::new(HashSet::new()),
                failing_items: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Store a profile row.
    pub fn insert_profile(&self, profile: Profile) {
        lock(&self.inner.profiles).insert(profile.subject_id.clone(), profile);
    }

    /// Hold fetches for `subject` open until the returned handle is notified.
    ///
    /// `notify_one` releases one fetch, even if it has not started yet.
    #[must_use]
    pub fn hold_fetch(&self, subject: &SubjectId) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        lock(&self.inner.held_fetches).insert(subject.clone(), Arc::clone(&notify));
        notify
    }

    /// Hold verification requests open until the returned handle is notified.
    #[must_use]
    pub fn hold_verify(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *lock(&self.inner.held_verify) = Some(Arc::clone(&notify));
        notify
    }

    /// Make fetches for `subject` fail with a server error.
    pub fn fail_fetch(&self, subject: &SubjectId) {
        lock(&self.inner.failing_fetches).insert(subject.clone());
    }

    /// Make order inserts for `vendor` fail.
    pub fn fail_orders_for(&self, vendor: VendorId) {
        lock(&self.inner.failing_orders).insert(vendor);
    }

    /// Make item inserts for orders of `vendor` fail.
    pub fn fail_items_for(&self, vendor: VendorId) {
        lock(&self.inner.failing_items).insert(vendor);
    }

    /// Profile fetches started so far.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Verification requests received so far.
    #[must_use]
    pub fn verify_calls(&self) -> usize {
        self.inner.verify_calls.load(Ordering::SeqCst)
    }

    /// Every stored order row.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        lock(&self.inner.orders).clone()
    }

    /// Stored item rows of one order.
    #[must_use]
    pub fn items_of(&self, order_id: OrderId) -> Vec<OrderItem> {
        lock(&self.inner.items)
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }
}

impl ProfileDirectory for FakeBackend {
    async fn fetch_profile(&self, subject: &SubjectId) -> Result<Option<Profile>, BackendError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);

        let held = lock(&self.inner.held_fetches).get(subject).cloned();
        if let Some(notify) = held {
            notify.notified().await;
        }

        if lock(&self.inner.failing_fetches).contains(subject) {
            return Err(BackendError::Unavailable("database unavailable".to_owned()));
        }
        Ok(lock(&self.inner.profiles).get(subject).cloned())
    }

    async fn create_profile(&self, new: &NewProfile) -> Result<Profile, BackendError> {
        let mut profiles = lock(&self.inner.profiles);
        let clash = profiles.values().any(|p| {
            p.subject_id == new.subject_id
                || p.hall_ticket.same_ticket(new.hall_ticket.as_str())
                || p.email.as_str().eq_ignore_ascii_case(new.email.as_str())
        });
        if clash {
            return Err(BackendError::Conflict("users unique constraint".to_owned()));
        }

        let row = Profile {
            id: ProfileId::random(),
            subject_id: new.subject_id.clone(),
            full_name: new.full_name.clone(),
            email: new.email.clone(),
            phone_number: new.phone_number.clone(),
            department: new.department.clone(),
            academic_year: new.academic_year.clone(),
            hall_ticket: new.hall_ticket.clone(),
            profile_picture_url: new.profile_picture_url.clone(),
            is_active: true,
            email_verified: new.email_verified,
        };
        profiles.insert(row.subject_id.clone(), row.clone());
        Ok(row)
    }

    async fn update_profile(
        &self,
        id: ProfileId,
        changes: &ProfileChanges,
    ) -> Result<Profile, BackendError> {
        let mut profiles = lock(&self.inner.profiles);
        let row = profiles
            .values_mut()
            .find(|p| p.id == id)
            .ok_or(BackendError::NotFound)?;
        if let Some(v) = &changes.full_name {
            row.full_name.clone_from(v);
        }
        if let Some(v) = &changes.phone_number {
            row.phone_number.clone_from(v);
        }
        if let Some(v) = &changes.department {
            row.department.clone_from(v);
        }
        if let Some(v) = &changes.academic_year {
            row.academic_year.clone_from(v);
        }
        if let Some(v) = &changes.profile_picture_url {
            row.profile_picture_url = Some(v.clone());
        }
        Ok(row.clone())
    }

    async fn hall_ticket_exists(&self, hall_ticket: &str) -> Result<bool, BackendError> {
        Ok(lock(&self.inner.profiles)
            .values()
            .any(|p| p.hall_ticket.same_ticket(hall_ticket)))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, BackendError> {
        Ok(lock(&self.inner.profiles)
            .values()
            .any(|p| p.email.as_str().eq_ignore_ascii_case(email)))
    }
}

impl VerificationEndpoint for FakeBackend {
    async fn verify(
        &self,
        candidate: &str,
        subject: &SubjectId,
    ) -> Result<VerificationReply, BackendError> {
        self.inner.verify_calls.fetch_add(1, Ordering::SeqCst);
        let held = lock(&self.inner.held_verify).clone();
        if let Some(notify) = held {
            notify.notified().await;
        }

        let now = Utc::now();
        let rate_limited = || VerificationReply::RateLimited {
            error: "Too many verification attempts. Please try again later.".to_owned(),
        };

        if self.inner.verification.is_rate_limited(subject, now) {
            return Ok(rate_limited());
        }
        let profile = lock(&self.inner.profiles)
            .get(subject)
            .cloned()
            .ok_or(BackendError::NotFound)?;

        Ok(match self.inner.verification.check(&profile, candidate, now) {
            VerificationDecision::Passed { token } => VerificationReply::Passed {
                token: token.to_string(),
            },
            VerificationDecision::Rejected => VerificationReply::Failed {
                error: "Invalid password".to_owned(),
            },
            VerificationDecision::RateLimited => rate_limited(),
        })
    }
}

impl OrderStore for FakeBackend {
    async fn insert_order(&self, new: &NewOrder) -> Result<Order, BackendError> {
        if lock(&self.inner.failing_orders).contains(&new.vendor_id) {
            return Err(BackendError::Unavailable("order insert failed".to_owned()));
        }
        let order = Order {
            id: OrderId::random(),
            student_id: new.student_id,
            vendor_id: new.vendor_id,
            total_price: new.total_price,
            service_fee: new.service_fee,
            payment_method: new.payment_method,
            qr_code: new.qr_code.clone(),
            notes: new.notes.clone(),
            pickup_deadline: new.pickup_deadline,
            status: OrderStatus::Placed,
            created_at: Utc::now(),
        };
        lock(&self.inner.orders).push(order.clone());
        Ok(order)
    }

    async fn insert_items(&self, new: &NewOrderItems) -> Result<Vec<OrderItem>, BackendError> {
        let vendor = lock(&self.inner.orders)
            .iter()
            .find(|o| o.id == new.order_id)
            .map(|o| o.vendor_id)
            .ok_or_else(|| BackendError::Conflict("order does not exist".to_owned()))?;
        if lock(&self.inner.failing_items).contains(&vendor) {
            return Err(BackendError::Timeout);
        }

        let rows: Vec<OrderItem> = new
            .items
            .iter()
            .map(|item| OrderItem {
                id: OrderItemId::random(),
                order_id: new.order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
            })
            .collect();
        lock(&self.inner.items).extend(rows.iter().cloned());
        Ok(rows)
    }
}
