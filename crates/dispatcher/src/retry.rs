//! RetryPolicy - pure retry/backoff decisions
//!
//! Never sleeps. The engine performs the wait so it can be cancelled by the
//! dispatch deadline.

use std::time::Duration;

use contracts::{RetrySettings, SubmitError};

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Try again
    pub retry: bool,
    /// Wait before the next attempt (zero when not retrying)
    pub backoff: Duration,
}

impl RetryDecision {
    fn retry_after(backoff: Duration) -> Self {
        Self {
            retry: true,
            backoff,
        }
    }

    fn give_up() -> Self {
        Self {
            retry: false,
            backoff: Duration::ZERO,
        }
    }
}

/// Exponential backoff bounded by an attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; zero is treated as one
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `base * 2^(attempt_number - 1)`, saturating
    pub fn backoff_for(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Decide after attempt `attempt_number` (1-based) failed with `error`
    pub fn should_retry(&self, attempt_number: u32, error: &SubmitError) -> RetryDecision {
        if error.is_transient() && attempt_number < self.max_attempts {
            RetryDecision::retry_after(self.backoff_for(attempt_number))
        } else {
            RetryDecision::give_up()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.backoff_base)
    }
}
