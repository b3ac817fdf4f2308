//! Destination metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::AttemptOutcome;

/// Counters for a single destination, shared by all dispatch calls
#[derive(Debug, Default)]
pub struct DestinationMetrics {
    /// Attempts recorded (every outcome, including intermediate failures)
    attempts: AtomicU64,
    /// Attempts that ended in `Success`
    successes: AtomicU64,
    /// Attempts that ended in `Failed`
    failures: AtomicU64,
    /// Backoff waits started
    retries: AtomicU64,
    /// `Skipped` outcomes (duplicate, deadline, history unavailable)
    skipped: AtomicU64,
    /// `RateLimited` outcomes
    rate_limited: AtomicU64,
    /// Attempts that could not be written to history
    history_failures: AtomicU64,
}

impl DestinationMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one recorded attempt
    pub fn observe(&self, outcome: &AttemptOutcome) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            AttemptOutcome::Success => &self.successes,
            AttemptOutcome::Failed => &self.failures,
            AttemptOutcome::Skipped(_) => &self.skipped,
            AttemptOutcome::RateLimited => &self.rate_limited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment retry count
    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment history failure count
    pub fn inc_history_failures(&self) {
        self.history_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total attempt count
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Get success count
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Get failure count
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts(),
            successes: self.successes(),
            failures: self.failures(),
            retries: self.retries.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            history_failures: self.history_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of destination metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub skipped: u64,
    pub rate_limited: u64,
    pub history_failures: u64,
}
