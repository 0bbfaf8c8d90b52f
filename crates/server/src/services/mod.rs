//! Business logic services for the backing service.
//!
//! # Services
//!
//! - `verification` - Order verification check with per-subject failure limit

pub mod verification;

pub use verification::{AttemptLimiter, VerificationDecision, VerificationService};
