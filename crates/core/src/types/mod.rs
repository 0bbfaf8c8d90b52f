//! Core types for Campus Connect.
//!
//! This module provides type-safe wrappers for common domain concepts, plus
//! the row shapes exchanged between the client core and the backing service.

pub mod email;
pub mod hall_ticket;
pub mod id;
pub mod money;
pub mod order;
pub mod profile;
pub mod status;
pub mod verification;

pub use email::{Email, EmailError};
pub use hall_ticket::{HallTicket, HallTicketError};
pub use id::*;
pub use money::{discounted_unit_price, line_subtotal, round_money, split_money};
pub use order::{NewOrder, NewOrderItem, NewOrderItems, Order, OrderItem, StatusChange};
pub use profile::{NewProfile, Profile, ProfileChanges, first_name};
pub use status::*;
pub use verification::{VerificationRequest, VerificationResponse};
