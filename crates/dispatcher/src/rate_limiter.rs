//! RateLimiter - per-destination admission control
//!
//! Each destination owns a `RateLimiterState` behind its own async mutex.
//! Rules are checked in a fixed order and the first one that fails decides
//! `retry_after`:
//!
//! 1. minimum interval since the last successful post
//! 2. hourly cap
//! 3. daily cap
//! 4. cooldown after a terminal failure
//!
//! Windows roll over lazily at the start of `admit`. A denial leaves the
//! counters untouched.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use contracts::{DestinationId, RateLimits};

use crate::clock::elapsed_between;
use crate::error::DispatcherError;

/// Length of the hourly window
pub const HOUR: Duration = Duration::from_secs(3600);
/// Length of the daily window
pub const DAY: Duration = Duration::from_secs(24 * 3600);
/// Successful post timestamps kept per destination
pub const RECENT_POSTS_CAPACITY: usize = 1000;

/// Rule that denied admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    MinInterval,
    HourlyCap,
    DailyCap,
    Cooldown,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MinInterval => "min_interval",
            DenyReason::HourlyCap => "hourly_cap",
            DenyReason::DailyCap => "daily_cap",
            DenyReason::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitDecision {
    /// Submission may proceed
    pub allowed: bool,
    /// Earliest moment admission could succeed, relative to the check
    pub retry_after: Duration,
    /// Failing rule (None when allowed)
    pub reason: Option<DenyReason>,
}

impl AdmitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
            reason: None,
        }
    }

    fn deny(reason: DenyReason, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
            reason: Some(reason),
        }
    }
}

/// Admission state of a single destination
#[derive(Debug, Clone)]
pub struct RateLimiterState {
    limits: RateLimits,
    window_start: Option<DateTime<Utc>>,
    day_start: Option<DateTime<Utc>>,
    hourly_count: u32,
    daily_count: u32,
    /// Most recent first
    recent_post_timestamps: VecDeque<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl RateLimiterState {
    /// Fresh state with empty windows
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            window_start: None,
            day_start: None,
            hourly_count: 0,
            daily_count: 0,
            recent_post_timestamps: VecDeque::with_capacity(16),
            last_failure_at: None,
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    pub fn hourly_count(&self) -> u32 {
        self.hourly_count
    }

    pub fn daily_count(&self) -> u32 {
        self.daily_count
    }

    /// Start of the current hour window (None when empty)
    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.window_start
    }

    /// Start of the current day window (None when empty)
    pub fn day_start(&self) -> Option<DateTime<Utc>> {
        self.day_start
    }

    /// Successful post timestamps, most recent first
    pub fn recent_posts(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.recent_post_timestamps.iter()
    }

    /// Timestamp of the last successful post
    pub fn last_post(&self) -> Option<DateTime<Utc>> {
        self.recent_post_timestamps.front().copied()
    }

    /// Check every rule at `now`
    pub fn admit(&mut self, now: DateTime<Utc>) -> AdmitDecision {
        self.roll_windows(now);

        let wait = self.wait_time(now);
        if !wait.is_zero() {
            return AdmitDecision::deny(DenyReason::MinInterval, wait);
        }

        if self.hourly_count >= self.limits.max_per_hour {
            let remaining = Self::window_remaining(self.window_start, HOUR, now);
            return AdmitDecision::deny(DenyReason::HourlyCap, remaining);
        }

        if self.daily_count >= self.limits.max_per_day {
            let remaining = Self::window_remaining(self.day_start, DAY, now);
            return AdmitDecision::deny(DenyReason::DailyCap, remaining);
        }

        let cooldown = self.limits.cooldown_after_failure;
        if let Some(failed_at) = self.last_failure_at {
            let elapsed = elapsed_between(failed_at, now);
            if elapsed < cooldown {
                return AdmitDecision::deny(DenyReason::Cooldown, cooldown - elapsed);
            }
        }

        AdmitDecision::allow()
    }

    /// Count a successful post at `now`
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.roll_windows(now);

        self.window_start.get_or_insert(now);
        self.day_start.get_or_insert(now);
        self.hourly_count = self.hourly_count.saturating_add(1);
        self.daily_count = self.daily_count.saturating_add(1);

        self.recent_post_timestamps.push_front(now);
        self.recent_post_timestamps.truncate(RECENT_POSTS_CAPACITY);
    }

    /// Start the failure cooldown at `now`
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.last_failure_at = Some(now);
    }

    /// Remaining minimum-interval wait at `now` (zero when none)
    pub fn wait_time(&self, now: DateTime<Utc>) -> Duration {
        match self.last_post() {
            Some(last) => self
                .limits
                .min_interval
                .saturating_sub(elapsed_between(last, now)),
            None => Duration::ZERO,
        }
    }

    fn roll_windows(&mut self, now: DateTime<Utc>) {
        if let Some(start) = self.window_start {
            if elapsed_between(start, now) >= HOUR {
                self.window_start = None;
                self.hourly_count = 0;
            }
        }
        if let Some(start) = self.day_start {
            if elapsed_between(start, now) >= DAY {
                self.day_start = None;
                self.daily_count = 0;
            }
        }
    }

    fn window_remaining(start: Option<DateTime<Utc>>, length: Duration, now: DateTime<Utc>) -> Duration {
        match start {
            Some(start) => length.saturating_sub(elapsed_between(start, now)),
            None => length,
        }
    }
}

/// Exclusive access to one destination's state.
///
/// Holding the slot makes `admit`, the submission and `record_success` one
/// critical section; it is released on drop.
pub struct AdmissionSlot {
    destination: DestinationId,
    state: OwnedMutexGuard<RateLimiterState>,
}

impl AdmissionSlot {
    pub fn destination(&self) -> &DestinationId {
        &self.destination
    }

    pub fn admit(&mut self, now: DateTime<Utc>) -> AdmitDecision {
        let decision = self.state.admit(now);
        if let Some(reason) = decision.reason {
            debug!(
                destination = %self.destination,
                reason = %reason,
                retry_after_ms = decision.retry_after.as_millis() as u64,
                "Admission denied"
            );
        }
        decision
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.state.record_success(now);
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.state.record_failure(now);
    }

    pub fn wait_time(&self, now: DateTime<Utc>) -> Duration {
        self.state.wait_time(now)
    }
}

/// Admission control for all registered destinations
#[derive(Debug, Default)]
pub struct RateLimiter {
    states: HashMap<DestinationId, Arc<Mutex<RateLimiterState>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a destination with its limits
    pub fn register(
        &mut self,
        destination: DestinationId,
        limits: RateLimits,
    ) -> Result<(), DispatcherError> {
        if self.states.contains_key(&destination) {
            return Err(DispatcherError::DuplicateDestination(
                destination.to_string(),
            ));
        }
        self.states
            .insert(destination, Arc::new(Mutex::new(RateLimiterState::new(limits))));
        Ok(())
    }

    /// Whether `destination` is registered
    pub fn contains(&self, destination: &str) -> bool {
        self.states.contains_key(destination)
    }

    /// Wait for exclusive access to a destination's state
    #[instrument(name = "rate_limiter_acquire", skip(self), fields(destination = %destination))]
    pub async fn acquire(&self, destination: &DestinationId) -> Result<AdmissionSlot, DispatcherError> {
        let state = self.state(destination)?;
        Ok(AdmissionSlot {
            destination: destination.clone(),
            state: state.lock_owned().await,
        })
    }

    /// One-shot admission check
    pub async fn admit(
        &self,
        destination: &DestinationId,
        now: DateTime<Utc>,
    ) -> Result<AdmitDecision, DispatcherError> {
        Ok(self.acquire(destination).await?.admit(now))
    }

    /// Count a successful post outside an admission slot
    pub async fn record_success(
        &self,
        destination: &DestinationId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatcherError> {
        self.acquire(destination).await?.record_success(now);
        Ok(())
    }

    /// Remaining minimum-interval wait
    pub async fn get_wait_time(
        &self,
        destination: &DestinationId,
        now: DateTime<Utc>,
    ) -> Result<Duration, DispatcherError> {
        Ok(self.acquire(destination).await?.wait_time(now))
    }

    /// Copy of a destination's state
    pub async fn snapshot(&self, destination: &DestinationId) -> Result<RateLimiterState, DispatcherError> {
        Ok(self.state(destination)?.lock().await.clone())
    }

    fn state(&self, destination: &DestinationId) -> Result<Arc<Mutex<RateLimiterState>>, DispatcherError> {
        self.states
            .get(destination)
            .cloned()
            .ok_or_else(|| DispatcherError::unknown_destination(destination.as_str()))
    }
}
