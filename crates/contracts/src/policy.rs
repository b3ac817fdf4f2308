//! Resolved per-destination policy
//!
//! What the rate limiter, retry policy and duplicate guard actually run with,
//! after configuration defaults have been merged.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Posts per hour when nothing is configured
pub const DEFAULT_MAX_PER_HOUR: u32 = 5;
/// Posts per day when nothing is configured
pub const DEFAULT_MAX_PER_DAY: u32 = 20;
/// Minimum spacing between two posts on one destination
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(300);
/// Attempts per dispatch, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// First backoff; doubles on every further attempt
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
/// How far back duplicate detection looks
pub const DEFAULT_DUPLICATE_LOOKBACK: Duration = Duration::from_secs(24 * 3600);
/// Longest configurable duplicate window, in seconds (ten years)
pub const MAX_DUPLICATE_LOOKBACK_SECS: u64 = 10 * 365 * 24 * 3600;

/// Admission-control limits of one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Successful posts allowed per hour window
    pub max_per_hour: u32,
    /// Successful posts allowed per day window
    pub max_per_day: u32,
    /// Minimum time between two successful posts
    pub min_interval: Duration,
    /// Admission pause after a terminal failure (zero disables it)
    pub cooldown_after_failure: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_per_hour: DEFAULT_MAX_PER_HOUR,
            max_per_day: DEFAULT_MAX_PER_DAY,
            min_interval: DEFAULT_MIN_INTERVAL,
            cooldown_after_failure: Duration::ZERO,
        }
    }
}

/// Retry parameters of one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts per dispatch, including the first
    pub max_attempts: u32,
    /// Backoff after the first failed attempt
    pub backoff_base: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// Everything the dispatcher needs to know about one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationPolicy {
    /// Admission control
    pub limits: RateLimits,
    /// Retry/backoff
    pub retry: RetrySettings,
    /// Duplicate detection window
    pub duplicate_lookback: Duration,
    /// Longest minimum-interval wait the engine sleeps through instead of
    /// reporting `RateLimited` (zero disables waiting)
    pub admission_wait: Duration,
}

impl Default for DestinationPolicy {
    fn default() -> Self {
        Self {
            limits: RateLimits::default(),
            retry: RetrySettings::default(),
            duplicate_lookback: DEFAULT_DUPLICATE_LOOKBACK,
            admission_wait: Duration::ZERO,
        }
    }
}

impl DestinationPolicy {
    /// Replace the rate limits
    pub fn with_limits(mut self, limits: RateLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the retry settings
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }
}
