//! Domain models for the client core.
//!
//! Profile and order rows are shared with the backing service and live in
//! `campus-core`; this module adds the client-only session types.

pub mod session;

pub use campus_core::{NewProfile, Order, Profile, ProfileChanges};
pub use session::{AuthEvent, Session, SessionState};
