//! DuplicateGuard - idempotency check against History
//!
//! Read-only: it never records anything itself.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use contracts::{ContentFingerprint, ContractError, DestinationId, History};

use crate::clock::to_time_delta;

/// Outcome of a duplicate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCheck {
    /// A prior success exists in the window
    pub is_duplicate: bool,
    /// Lookback window that was consulted
    pub within_window: Duration,
    /// When the prior success happened
    pub prior_success_at: Option<DateTime<Utc>>,
}

impl DuplicateCheck {
    fn clear(window: Duration) -> Self {
        Self {
            is_duplicate: false,
            within_window: window,
            prior_success_at: None,
        }
    }
}

/// Looks up prior successes for `(destination, fingerprint)`
#[derive(Clone)]
pub struct DuplicateGuard {
    history: Arc<dyn History>,
}

impl DuplicateGuard {
    pub fn new(history: Arc<dyn History>) -> Self {
        Self { history }
    }

    /// Whether the content was already published on `destination` within
    /// `lookback` of `now`. A zero lookback disables the check.
    ///
    /// # Errors
    /// History query failure.
    #[instrument(
        name = "duplicate_guard_check",
        skip(self, fingerprint),
        fields(destination = %destination, lookback_secs = lookback.as_secs())
    )]
    pub async fn check_duplicate(
        &self,
        destination: &DestinationId,
        fingerprint: &ContentFingerprint,
        lookback: Duration,
        now: DateTime<Utc>,
    ) -> Result<DuplicateCheck, ContractError> {
        if lookback.is_zero() {
            return Ok(DuplicateCheck::clear(lookback));
        }

        // a window reaching past the representable range means "ever"
        let since = now
            .checked_sub_signed(to_time_delta(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let prior = self
            .history
            .find_recent_success(destination, fingerprint, since)
            .await?;

        match prior {
            Some(attempt) => {
                debug!(
                    destination = %destination,
                    prior_content_id = %attempt.content_id,
                    prior_at = %attempt.timestamp,
                    "Duplicate found"
                );
                Ok(DuplicateCheck {
                    is_duplicate: true,
                    within_window: lookback,
                    prior_success_at: Some(attempt.timestamp),
                })
            }
            None => Ok(DuplicateCheck::clear(lookback)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use chrono::TimeDelta;
    use contracts::{AttemptOutcome, SubmissionAttempt};

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn attempt(
        destination: &str,
        fingerprint: &ContentFingerprint,
        at: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) -> SubmissionAttempt {
        SubmissionAttempt::new(destination.into(), fingerprint.clone(), "c1", 1, at, outcome)
    }

    #[tokio::test]
    async fn test_prior_success_in_window_is_duplicate() {
        let now = Utc::now();
        let fp = ContentFingerprint::from_hex("aa");
        let history = Arc::new(InMemoryHistory::new());
        history
            .record(attempt("x", &fp, now - TimeDelta::hours(3), AttemptOutcome::Success))
            .await
            .unwrap();

        let guard = DuplicateGuard::new(history);
        let check = guard.check_duplicate(&"x".into(), &fp, DAY, now).await.unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.within_window, DAY);
        assert_eq!(check.prior_success_at, Some(now - TimeDelta::hours(3)));
    }

    #[tokio::test]
    async fn test_old_success_outside_window() {
        let now = Utc::now();
        let fp = ContentFingerprint::from_hex("aa");
        let history = Arc::new(InMemoryHistory::new());
        history
            .record(attempt("x", &fp, now - TimeDelta::hours(25), AttemptOutcome::Success))
            .await
            .unwrap();

        let guard = DuplicateGuard::new(history);
        let check = guard.check_duplicate(&"x".into(), &fp, DAY, now).await.unwrap();
        assert!(!check.is_duplicate);
        assert_eq!(check.prior_success_at, None);
    }

    #[tokio::test]
    async fn test_failures_and_other_destinations_do_not_count() {
        let now = Utc::now();
        let fp = ContentFingerprint::from_hex("aa");
        let history = Arc::new(InMemoryHistory::new());
        history
            .record(attempt("x", &fp, now, AttemptOutcome::Failed))
            .await
            .unwrap();
        history
            .record(attempt("y", &fp, now, AttemptOutcome::Success))
            .await
            .unwrap();

        let guard = DuplicateGuard::new(history);
        let check = guard.check_duplicate(&"x".into(), &fp, DAY, now).await.unwrap();
        assert!(!check.is_duplicate);
    }

    #[tokio::test]
    async fn test_zero_lookback_disables_check() {
        let now = Utc::now();
        let fp = ContentFingerprint::from_hex("aa");
        let history = Arc::new(InMemoryHistory::new());
        history
            .record(attempt("x", &fp, now, AttemptOutcome::Success))
            .await
            .unwrap();

        let guard = DuplicateGuard::new(history);
        let check = guard
            .check_duplicate(&"x".into(), &fp, Duration::ZERO, now)
            .await
            .unwrap();
        assert!(!check.is_duplicate);
    }

    #[tokio::test]
    async fn test_unbounded_lookback_covers_all_history() {
        let now = Utc::now();
        let fp = ContentFingerprint::from_hex("aa");
        let history = Arc::new(InMemoryHistory::new());
        history
            .record(attempt("x", &fp, now - TimeDelta::days(3650), AttemptOutcome::Success))
            .await
            .unwrap();

        let guard = DuplicateGuard::new(history);
        let check = guard
            .check_duplicate(&"x".into(), &fp, Duration::from_secs(u64::MAX), now)
            .await
            .unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.within_window, Duration::from_secs(u64::MAX));
    }
}
