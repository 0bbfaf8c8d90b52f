//! Campus Connect client core.
//!
//! Keeps the identity provider's session, the application profile and the
//! per-session order verification consistent across asynchronous fetches,
//! and turns a multi-vendor cart into one order per vendor.
//!
//! # Components
//!
//! - [`session::SessionStore`] - who, if anyone, is signed in
//! - [`profile::ProfileResolver`] - one in-flight profile fetch per subject
//! - [`verification::VerificationGate`] - once-per-session re-authentication
//! - [`orders::OrderComposer`] - cart to per-vendor order rows
//! - [`guard::RouteGuard`] - settles whether a protected view may render
//! - [`context::CampusClient`] - single construction point wiring them together
//!
//! The backing service is reached through the traits in [`backend`];
//! [`backend::RestBackend`] is the HTTP implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cart;
pub mod config;
pub mod context;
pub mod guard;
pub mod models;
pub mod orders;
pub mod profile;
pub mod registration;
pub mod session;
pub mod storage;
pub mod verification;

pub use context::CampusClient;
