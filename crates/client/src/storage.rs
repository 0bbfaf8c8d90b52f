//! Session-scoped client storage.
//!
//! Stands in for browser session storage: values live as long as the tab's
//! session and are never written anywhere durable. Holds the order
//! verification token and the reset-link access marker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Storage keys.
pub mod keys {
    /// Opaque token from a passed order verification.
    pub const VERIFICATION_TOKEN: &str = "user_verification_token";

    /// Unix milliseconds at which a password reset link was first opened.
    pub const RESET_LINK_ACCESS_TIME: &str = "reset_link_access_time";
}

/// In-memory key/value storage scoped to one client session.
///
/// Cheaply cloneable; clones share the same entries. Every [`Self::clear`]
/// starts a new generation, so a writer that began before a sign-out can
/// tell that its session is gone.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    entries: Arc<Mutex<Entries>>,
}

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<String, String>,
    generation: u64,
}

impl SessionStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    /// Write a value, replacing any previous one.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.lock().values.insert(key.to_owned(), value.into());
    }

    /// Write a value only if no clear has happened since `generation` was
    /// read. Returns whether it was written.
    pub fn set_in_generation(&self, generation: u64, key: &str, value: impl Into<String>) -> bool {
        let mut entries = self.lock();
        if entries.generation != generation {
            return false;
        }
        entries.values.insert(key.to_owned(), value.into());
        true
    }

    /// Write a value only if the key is absent. Returns whether it was written.
    pub fn set_if_absent(&self, key: &str, value: impl Into<String>) -> bool {
        let mut entries = self.lock();
        if entries.values.contains_key(key) {
            return false;
        }
        entries.values.insert(key.to_owned(), value.into());
        true
    }

    /// Remove a value, returning it.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock().values.remove(key)
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().values.contains_key(key)
    }

    /// Drop every entry and start a new generation.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.values.clear();
        entries.generation = entries.generation.wrapping_add(1);
    }

    /// The current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        // Entries are plain strings; a panic mid-write cannot leave them torn
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Expiry window for a password reset link, measured from its first open.
///
/// The first access time is written once to session storage so that reloading
/// the reset page does not restart the window.
#[derive(Debug, Clone)]
pub struct ResetLinkWindow {
    storage: SessionStorage,
    window: Duration,
}

impl ResetLinkWindow {
    /// Create a window backed by the given storage.
    #[must_use]
    pub const fn new(storage: SessionStorage, window: Duration) -> Self {
        Self { storage, window }
    }

    /// Record the first access, keeping an earlier marker if one exists.
    ///
    /// Returns the reference time the window is measured from.
    pub fn record_access(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.storage.set_if_absent(
            keys::RESET_LINK_ACCESS_TIME,
            now.timestamp_millis().to_string(),
        );
        self.first_access().unwrap_or(now)
    }

    /// When the link was first opened, if recorded.
    #[must_use]
    pub fn first_access(&self) -> Option<DateTime<Utc>> {
        self.storage
            .get(keys::RESET_LINK_ACCESS_TIME)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Whether the window has elapsed. An unrecorded link is not expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.first_access()
            .is_some_and(|first| now - first >= self.window)
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.first_access().map_or(self.window, |first| {
            (first + self.window - now).max(Duration::zero())
        })
    }

    /// Forget the marker, e.g. after the password was changed.
    pub fn reset(&self) {
        self.storage.remove(keys::RESET_LINK_ACCESS_TIME);
    }
}
