//! FanoutBlueprint - Config Loader output
//!
//! Describes the destinations to publish to, their policies, where attempt
//! history is kept, and dispatch-wide settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::{DestinationPolicy, RateLimits, RetrySettings, MAX_DUPLICATE_LOOKBACK_SECS};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FanoutBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Policy values applied to every destination that omits them
    #[serde(default)]
    #[validate(nested)]
    pub defaults: PolicyConfig,

    /// Publishing targets
    #[validate(nested)]
    pub destinations: Vec<DestinationConfig>,

    /// Attempt history storage
    #[serde(default)]
    pub history: HistoryConfig,

    /// Dispatch-wide settings
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

impl FanoutBlueprint {
    /// Destinations with `enabled = true`
    pub fn enabled_destinations(&self) -> impl Iterator<Item = &DestinationConfig> {
        self.destinations.iter().filter(|d| d.enabled)
    }

    /// Resolved policy for one destination config
    pub fn policy_for(&self, destination: &DestinationConfig) -> DestinationPolicy {
        destination.policy.resolve(&self.defaults)
    }
}

/// Policy values as written in configuration; all optional.
///
/// Durations are whole seconds except the backoff base, which is in
/// milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PolicyConfig {
    /// Successful posts allowed per hour
    #[validate(range(min = 1))]
    pub max_per_hour: Option<u32>,

    /// Successful posts allowed per day
    #[validate(range(min = 1))]
    pub max_per_day: Option<u32>,

    /// Minimum seconds between two posts
    pub min_interval_secs: Option<u64>,

    /// Seconds of admission pause after a terminal failure
    pub cooldown_after_failure_secs: Option<u64>,

    /// Attempts per dispatch, including the first
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: Option<u32>,

    /// First backoff in milliseconds
    #[validate(range(min = 1))]
    pub backoff_base_ms: Option<u64>,

    /// Duplicate detection window in seconds
    #[validate(range(max = MAX_DUPLICATE_LOOKBACK_SECS))]
    pub duplicate_lookback_secs: Option<u64>,

    /// Longest minimum-interval wait (seconds) to sleep through
    pub admission_wait_secs: Option<u64>,
}

impl PolicyConfig {
    /// Merge `self` over `defaults` over built-in defaults
    pub fn resolve(&self, defaults: &PolicyConfig) -> DestinationPolicy {
        let base = DestinationPolicy::default();
        let secs = |own: Option<u64>, fallback: Option<u64>, builtin: Duration| {
            own.or(fallback).map(Duration::from_secs).unwrap_or(builtin)
        };

        DestinationPolicy {
            limits: RateLimits {
                max_per_hour: self
                    .max_per_hour
                    .or(defaults.max_per_hour)
                    .unwrap_or(base.limits.max_per_hour),
                max_per_day: self
                    .max_per_day
                    .or(defaults.max_per_day)
                    .unwrap_or(base.limits.max_per_day),
                min_interval: secs(
                    self.min_interval_secs,
                    defaults.min_interval_secs,
                    base.limits.min_interval,
                ),
                cooldown_after_failure: secs(
                    self.cooldown_after_failure_secs,
                    defaults.cooldown_after_failure_secs,
                    base.limits.cooldown_after_failure,
                ),
            },
            retry: RetrySettings {
                max_attempts: self
                    .max_attempts
                    .or(defaults.max_attempts)
                    .unwrap_or(base.retry.max_attempts),
                backoff_base: self
                    .backoff_base_ms
                    .or(defaults.backoff_base_ms)
                    .map(Duration::from_millis)
                    .unwrap_or(base.retry.backoff_base),
            },
            duplicate_lookback: secs(
                self.duplicate_lookback_secs,
                defaults.duplicate_lookback_secs,
                base.duplicate_lookback,
            ),
            admission_wait: secs(
                self.admission_wait_secs,
                defaults.admission_wait_secs,
                base.admission_wait,
            ),
        }
    }
}

/// Kind of destination client to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Log the payload only (dry run)
    Log,
    /// Append the payload to a JSON-lines outbox file
    File,
    /// POST the payload as JSON to an HTTP endpoint
    Webhook,
}

/// One publishing target
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DestinationConfig {
    /// Unique destination id
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    /// Client implementation
    pub client: ClientType,

    /// Disabled destinations are never registered with the engine
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-destination policy overrides
    #[serde(default)]
    #[validate(nested)]
    pub policy: PolicyConfig,

    /// Maximum body length in characters accepted by this destination
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_length: Option<usize>,

    /// Destination requires a title
    #[serde(default)]
    pub require_title: bool,

    /// Client-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

/// Where attempts are recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryBackend {
    /// Process memory only
    #[default]
    Memory,
    /// Append-only JSON-lines file
    Jsonl,
}

/// History configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: HistoryBackend,

    /// File path (JSON-lines backend)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Dispatch-wide settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Default deadline for one dispatch call in seconds (none = unbounded)
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl DispatchSettings {
    /// Deadline as a duration
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MIN_INTERVAL};

    #[test]
    fn test_resolve_prefers_own_then_defaults() {
        let defaults = PolicyConfig {
            max_per_hour: Some(10),
            min_interval_secs: Some(60),
            ..Default::default()
        };
        let own = PolicyConfig {
            max_per_hour: Some(2),
            ..Default::default()
        };

        let policy = own.resolve(&defaults);
        assert_eq!(policy.limits.max_per_hour, 2);
        assert_eq!(policy.limits.min_interval, Duration::from_secs(60));
        assert_eq!(policy.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_resolve_builtin_defaults() {
        let policy = PolicyConfig::default().resolve(&PolicyConfig::default());
        assert_eq!(policy, DestinationPolicy::default());
        assert_eq!(policy.limits.min_interval, DEFAULT_MIN_INTERVAL);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let policy = PolicyConfig {
            max_attempts: Some(0),
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_duplicate_lookback() {
        let within = PolicyConfig {
            duplicate_lookback_secs: Some(MAX_DUPLICATE_LOOKBACK_SECS),
            ..Default::default()
        };
        assert!(within.validate().is_ok());

        let beyond = PolicyConfig {
            duplicate_lookback_secs: Some(u64::MAX),
            ..Default::default()
        };
        assert!(beyond.validate().is_err());
    }
}
