//! Status enums for campus orders.

use serde::{Deserialize, Serialize};

/// Lifecycle of a campus order.
///
/// ```text
/// placed -> accepted -> ready -> completed
///    \          \
///     +----------+--> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created by the student, not yet seen by the vendor.
    #[default]
    Placed,
    /// Vendor has accepted and is preparing.
    Accepted,
    /// Ready for pickup.
    Ready,
    /// Picked up.
    Completed,
    /// Cancelled before it became ready.
    Cancelled,
}

impl OrderStatus {
    /// Whether moving from `self` to `next` is an allowed step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Placed, Self::Accepted)
                | (Self::Accepted, Self::Ready)
                | (Self::Ready, Self::Completed)
                | (Self::Placed | Self::Accepted, Self::Cancelled)
        )
    }

    /// No further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Shown on the vendor's live order board.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Placed | Self::Accepted | Self::Ready)
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Accepted => "accepted",
            Self::Ready => "ready",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(Self::Placed),
            "accepted" => Ok(Self::Accepted),
            "ready" => Ok(Self::Ready),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// How the student pays at pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Upi,
    Card,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cash => write!(f, "cash"),
            Self::Upi => write!(f, "upi"),
            Self::Card => write!(f, "card"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "upi" => Ok(Self::Upi),
            "card" => Ok(Self::Card),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Placed,
        OrderStatus::Accepted,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_happy_path_transitions() {
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Accepted));
        assert!(OrderStatus::Accepted.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_cancellation_only_before_ready() {
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Accepted.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_no_skips_or_reversals() {
        assert!(!OrderStatus::Placed.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Accepted));
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_live_states() {
        let live: Vec<_> = ALL.into_iter().filter(|s| s.is_live()).collect();
        assert_eq!(
            live,
            vec![OrderStatus::Placed, OrderStatus::Accepted, OrderStatus::Ready]
        );
    }

    #[test]
    fn test_wire_names() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Upi).unwrap(),
            "\"upi\""
        );
    }
}
