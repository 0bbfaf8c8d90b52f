//! Sliding-window failure counter, per subject.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use campus_core::SubjectId;

use crate::config::VerificationLimits;

/// Counts failed attempts per subject inside a sliding window.
///
/// Checking the lockout and recording the outcome happen under one lock, so
/// concurrent attempts cannot slip past the limit together.
#[derive(Debug)]
pub struct AttemptLimiter {
    limits: VerificationLimits,
    failures: Mutex<HashMap<SubjectId, VecDeque<DateTime<Utc>>>>,
}

impl AttemptLimiter {
    #[must_use]
    pub fn new(limits: VerificationLimits) -> Self {
        Self {
            limits,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `subject` has used up its failures for the current window.
    #[must_use]
    pub fn is_limited(&self, subject: &SubjectId, now: DateTime<Utc>) -> bool {
        let mut failures = self.lock();
        self.recent(&mut failures, subject, now) >= self.limits.max_failures
    }

    /// Record one attempt.
    ///
    /// Returns `None` if the subject is locked out, in which case nothing is
    /// recorded. Otherwise a success clears the history, a failure is added
    /// to it, and the resulting failure count is returned.
    pub fn attempt(&self, subject: &SubjectId, now: DateTime<Utc>, succeeded: bool) -> Option<usize> {
        let mut failures = self.lock();
        if self.recent(&mut failures, subject, now) >= self.limits.max_failures {
            return None;
        }

        if succeeded {
            failures.remove(subject);
            return Some(0);
        }

        let history = failures.entry(subject.clone()).or_default();
        history.push_back(now);
        Some(history.len())
    }

    /// Failures inside the window ending at `now`, dropping older ones.
    fn recent(
        &self,
        failures: &mut HashMap<SubjectId, VecDeque<DateTime<Utc>>>,
        subject: &SubjectId,
        now: DateTime<Utc>,
    ) -> usize {
        let Some(history) = failures.get_mut(subject) else {
            return 0;
        };
        while history
            .front()
            .is_some_and(|at| now - *at >= self.limits.window)
        {
            history.pop_front();
        }
        let count = history.len();
        if count == 0 {
            failures.remove(subject);
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubjectId, VecDeque<DateTime<Utc>>>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
