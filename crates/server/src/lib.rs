//! Campus Connect backing service library.
//!
//! Serves profile rows, the registration existence checks, the order
//! verification check, and order writes over JSON. Built as a library so
//! the router can be exercised in tests and the CLI can reuse the
//! repositories.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
