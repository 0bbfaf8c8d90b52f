//! Order verification check.
//!
//! The expected password is `"@"`, the lowercased first word of the
//! profile's full name, then the last four characters of its hall ticket.
//! It is derived here and compared here; it never leaves this module, not
//! even in a log line.

mod limiter;

pub use limiter::AttemptLimiter;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use campus_core::{Profile, SubjectId};

use crate::config::VerificationLimits;

/// Result of checking one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationDecision {
    /// The candidate matched; carries a fresh opaque token.
    Passed { token: Uuid },
    /// The candidate did not match; the failure was recorded.
    Rejected,
    /// Too many recent failures; the candidate was not compared.
    RateLimited,
}

/// Checks verification candidates against profiles.
#[derive(Debug)]
pub struct VerificationService {
    limiter: AttemptLimiter,
}

impl VerificationService {
    #[must_use]
    pub fn new(limits: VerificationLimits) -> Self {
        Self {
            limiter: AttemptLimiter::new(limits),
        }
    }

    /// Whether the subject is currently locked out.
    #[must_use]
    pub fn is_rate_limited(&self, subject: &SubjectId, now: DateTime<Utc>) -> bool {
        self.limiter.is_limited(subject, now)
    }

    /// Check `candidate` for `profile`.
    ///
    /// The lockout is checked first, so a locked-out subject is refused even
    /// with the right candidate. A match clears the subject's failure
    /// history; a mismatch adds to it.
    #[instrument(skip_all, fields(subject = %profile.subject_id))]
    pub fn check(
        &self,
        profile: &Profile,
        candidate: &str,
        now: DateTime<Utc>,
    ) -> VerificationDecision {
        let expected = expected_password(profile);
        let matched = constant_time_eq(candidate.as_bytes(), expected.as_bytes());

        let Some(failures) = self.limiter.attempt(&profile.subject_id, now, matched) else {
            warn!("Verification refused, too many failed attempts");
            return VerificationDecision::RateLimited;
        };

        if matched {
            info!("Verification passed");
            VerificationDecision::Passed {
                token: Uuid::new_v4(),
            }
        } else {
            info!(failures, "Verification failed");
            VerificationDecision::Rejected
        }
    }
}

/// `@` + lowercase first name + last four of the hall ticket.
fn expected_password(profile: &Profile) -> String {
    format!(
        "@{}{}",
        profile.first_name().to_lowercase(),
        profile.hall_ticket.last4()
    )
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use campus_core::{Email, HallTicket, ProfileId};
    use chrono::Duration;

    use super::*;

    fn profile(full_name: &str, hall_ticket: &str) -> Profile {
        Profile {
            id: ProfileId::random(),
            subject_id: SubjectId::new("uid-1"),
            full_name: full_name.to_owned(),
            email: Email::parse("asha@college.edu").unwrap(),
            phone_number: "9876543210".to_owned(),
            department: "CSE".to_owned(),
            academic_year: "3".to_owned(),
            hall_ticket: HallTicket::parse(hall_ticket).unwrap(),
            profile_picture_url: None,
            is_active: true,
            email_verified: true,
        }
    }

    fn service() -> VerificationService {
        VerificationService::new(VerificationLimits::default())
    }

    #[test]
    fn test_expected_password() {
        assert_eq!(expected_password(&profile("Asha Rao", "2023A51234")), "@asha1234");
        assert_eq!(
            expected_password(&profile("  RAVI Kumar ", "21B81A0542")),
            "@ravi0542"
        );
    }

    #[test]
    fn test_hall_ticket_letters_keep_their_case() {
        let profile = profile("Meera Iyer", "22b91a05c4");
        assert_eq!(expected_password(&profile), "@meera05c4");

        let service = service();
        let now = Utc::now();
        assert_eq!(
            service.check(&profile, "@meera05C4", now),
            VerificationDecision::Rejected
        );
        assert!(matches!(
            service.check(&profile, "@meera05c4", now),
            VerificationDecision::Passed { .. }
        ));
    }

    #[test]
    fn test_right_candidate_passes() {
        let decision = service().check(&profile("Asha Rao", "2023A51234"), "@asha1234", Utc::now());
        assert!(matches!(decision, VerificationDecision::Passed { .. }));
    }

    #[test]
    fn test_wrong_case_fails() {
        let decision = service().check(&profile("Asha Rao", "2023A51234"), "@Asha1234", Utc::now());
        assert_eq!(decision, VerificationDecision::Rejected);
    }

    #[test]
    fn test_sixth_attempt_is_limited_even_if_right() {
        let service = service();
        let profile = profile("Asha Rao", "2023A51234");
        let now = Utc::now();

        for i in 0..5 {
            let at = now + Duration::seconds(i);
            assert_eq!(service.check(&profile, "wrong", at), VerificationDecision::Rejected);
        }
        let at = now + Duration::seconds(10);
        assert!(service.is_rate_limited(&profile.subject_id, at));
        assert_eq!(
            service.check(&profile, "@asha1234", at),
            VerificationDecision::RateLimited
        );
    }

    #[test]
    fn test_lockout_expires_with_window() {
        let service = service();
        let profile = profile("Asha Rao", "2023A51234");
        let now = Utc::now();
        for _ in 0..5 {
            service.check(&profile, "wrong", now);
        }

        let later = now + Duration::minutes(15);
        assert!(!service.is_rate_limited(&profile.subject_id, later));
        assert!(matches!(
            service.check(&profile, "@asha1234", later),
            VerificationDecision::Passed { .. }
        ));
    }

    #[test]
    fn test_tokens_are_fresh() {
        let service = service();
        let profile = profile("Asha Rao", "2023A51234");
        let first = service.check(&profile, "@asha1234", Utc::now());
        let second = service.check(&profile, "@asha1234", Utc::now());
        assert_ne!(first, second);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"@asha1234", b"@asha1234"));
        assert!(!constant_time_eq(b"@asha1234", b"@asha1235"));
        assert!(!constant_time_eq(b"@asha", b"@asha1234"));
    }
}
