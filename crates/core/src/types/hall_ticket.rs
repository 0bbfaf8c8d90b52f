//! Hall ticket (student enrolment number) type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`HallTicket`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HallTicketError {
    /// Fewer than the minimum number of characters.
    #[error("hall ticket must be at least {min} characters")]
    TooShort {
        /// Minimum allowed length.
        min: usize,
    },
    /// More than the maximum number of characters.
    #[error("hall ticket must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// Contains something other than ASCII letters and digits.
    #[error("hall ticket may only contain letters and digits")]
    InvalidCharacter,
}

/// A student's hall ticket number, e.g. `2023A51234`.
///
/// Stored as entered: the last four characters feed the order verification
/// password and keep their case. Uniqueness across profiles ignores case, see
/// [`Self::same_ticket`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HallTicket(String);

impl HallTicket {
    /// Minimum length; the last four characters feed the order verification
    /// password, so anything shorter cannot be verified.
    pub const MIN_LENGTH: usize = 4;
    /// Maximum length.
    pub const MAX_LENGTH: usize = 20;

    /// Parse a hall ticket, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns a [`HallTicketError`] if the length or alphabet is invalid.
    pub fn parse(s: &str) -> Result<Self, HallTicketError> {
        let s = s.trim();
        if s.len() < Self::MIN_LENGTH {
            return Err(HallTicketError::TooShort {
                min: Self::MIN_LENGTH,
            });
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(HallTicketError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(HallTicketError::InvalidCharacter);
        }
        Ok(Self(s.to_owned()))
    }

    /// Whether two tickets name the same enrolment, ignoring case.
    #[must_use]
    pub fn same_ticket(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }

    /// Returns the hall ticket as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last four characters.
    #[must_use]
    pub fn last4(&self) -> &str {
        // ASCII only, so byte slicing lands on char boundaries
        self.0.get(self.0.len().saturating_sub(4)..).unwrap_or(&self.0)
    }
}

impl fmt::Display for HallTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HallTicket {
    type Error = HallTicketError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<HallTicket> for String {
    fn from(ticket: HallTicket) -> Self {
        ticket.0
    }
}

impl AsRef<str> for HallTicket {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_keeps_case() {
        let ticket = HallTicket::parse(" 22b91a05c4 ").unwrap();
        assert_eq!(ticket.as_str(), "22b91a05c4");
        assert_eq!(ticket.last4(), "05c4");
    }

    #[test]
    fn test_same_ticket_ignores_case() {
        let ticket = HallTicket::parse("22b91a05c4").unwrap();
        assert!(ticket.same_ticket("22B91A05C4"));
        assert!(ticket.same_ticket(" 22b91a05c4 "));
        assert!(!ticket.same_ticket("22b91a05c5"));
    }

    #[test]
    fn test_last4() {
        assert_eq!(HallTicket::parse("2023A51234").unwrap().last4(), "1234");
        assert_eq!(HallTicket::parse("AB12").unwrap().last4(), "AB12");
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            HallTicket::parse("123"),
            Err(HallTicketError::TooShort { min: 4 })
        ));
        assert!(matches!(
            HallTicket::parse(&"1".repeat(21)),
            Err(HallTicketError::TooLong { max: 20 })
        ));
        assert_eq!(
            HallTicket::parse("2023-A5-1234"),
            Err(HallTicketError::InvalidCharacter)
        );
    }
}
