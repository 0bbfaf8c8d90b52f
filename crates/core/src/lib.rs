//! Campus Connect Core - Shared types library.
//!
//! This crate provides common types used across all Campus Connect components:
//! - `client` - Session, profile, verification and order placement core
//! - `server` - Backing service for profiles, verification and orders
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, hall tickets,
//!   money arithmetic and order statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
