//! SubmissionAttempt / DispatchResult - Dispatcher output
//!
//! Attempts form an append-only log: every admission denial, skip, failure
//! and success produces exactly one record, written to History before the
//! caller sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::{ContentFingerprint, DestinationId, SubmitErrorKind};

/// Why a destination was skipped without submitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A prior success with the same fingerprint exists in the lookback window
    Duplicate,
    /// The dispatch deadline elapsed before the destination started
    DeadlineExceeded,
    /// History could not be queried, so the duplicate check could not run
    HistoryUnavailable,
}

impl SkipReason {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::DeadlineExceeded => "deadline_exceeded",
            SkipReason::HistoryUnavailable => "history_unavailable",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Destination accepted the submission
    Success,
    /// Destination rejected the submission or it could not be delivered
    Failed,
    /// Policy decision, nothing was submitted
    Skipped(SkipReason),
    /// Local admission control denied the submission
    RateLimited,
}

impl AttemptOutcome {
    /// Short label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Skipped(_) => "skipped",
            AttemptOutcome::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Skipped(reason) => write!(f, "skipped({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// One attempt to publish one item on one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAttempt {
    /// Target destination
    pub destination: DestinationId,

    /// Destination fingerprint of the content
    pub fingerprint: ContentFingerprint,

    /// Id of the dispatched `ContentItem`
    pub content_id: String,

    /// 1-based attempt number within one dispatch call
    pub attempt_number: u32,

    /// When the outcome was observed
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub outcome: AttemptOutcome,

    /// Human-readable error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// Classification of the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SubmitErrorKind>,

    /// Admission retry hint in milliseconds (rate-limited attempts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,

    /// Backoff scheduled after this failed attempt, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,

    /// Id assigned by the destination on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_post_id: Option<String>,
}

impl SubmissionAttempt {
    /// Create an attempt record with no error details
    pub fn new(
        destination: DestinationId,
        fingerprint: ContentFingerprint,
        content_id: impl Into<String>,
        attempt_number: u32,
        timestamp: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            destination,
            fingerprint,
            content_id: content_id.into(),
            attempt_number,
            timestamp,
            outcome,
            error_detail: None,
            error_kind: None,
            retry_after_ms: None,
            backoff_ms: None,
            destination_post_id: None,
        }
    }

    /// Attach an error classification and message
    pub fn with_error(mut self, kind: SubmitErrorKind, detail: impl Into<String>) -> Self {
        self.error_kind = Some(kind);
        self.error_detail = Some(detail.into());
        self
    }

    /// Attach a message without a classification
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    /// Attach the admission retry hint
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(duration_ms(retry_after));
        self
    }

    /// Attach the backoff that follows this attempt
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff_ms = Some(duration_ms(backoff));
        self
    }

    /// Attach the destination-assigned post id
    pub fn with_post_id(mut self, post_id: Option<String>) -> Self {
        self.destination_post_id = post_id;
        self
    }

    /// Admission retry hint
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    /// Scheduled backoff
    pub fn backoff(&self) -> Option<Duration> {
        self.backoff_ms.map(Duration::from_millis)
    }

    /// True for `Success`
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Consolidated result of one dispatch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Id of the dispatched item
    pub content_id: String,

    /// When the call started
    pub started_at: DateTime<Utc>,

    /// When the last destination finished
    pub finished_at: DateTime<Utc>,

    /// Terminal attempt per destination
    pub outcomes: BTreeMap<DestinationId, SubmissionAttempt>,
}

impl DispatchResult {
    /// Terminal attempt for one destination
    pub fn get(&self, destination: &str) -> Option<&SubmissionAttempt> {
        self.outcomes.get(destination)
    }

    /// Terminal outcome for one destination
    pub fn outcome(&self, destination: &str) -> Option<AttemptOutcome> {
        self.get(destination).map(|attempt| attempt.outcome)
    }

    /// Iterate destinations in name order
    pub fn iter(&self) -> impl Iterator<Item = (&DestinationId, &SubmissionAttempt)> {
        self.outcomes.iter()
    }

    /// Destinations that ended in `Success`
    pub fn succeeded(&self) -> Vec<&DestinationId> {
        self.outcomes
            .iter()
            .filter(|(_, attempt)| attempt.is_success())
            .map(|(destination, _)| destination)
            .collect()
    }

    /// True when every requested destination succeeded
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(SubmissionAttempt::is_success)
    }

    /// True when at least one destination succeeded
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.values().any(SubmissionAttempt::is_success)
    }

    /// Number of destinations in the result
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when no destination was requested
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(outcome: AttemptOutcome) -> SubmissionAttempt {
        SubmissionAttempt::new(
            "devto".into(),
            ContentFingerprint::from_hex("ab"),
            "item-1",
            1,
            Utc::now(),
            outcome,
        )
    }

    #[test]
    fn test_outcome_serde_shape() {
        let json = serde_json::to_string(&AttemptOutcome::Skipped(SkipReason::Duplicate)).unwrap();
        assert_eq!(json, r#"{"status":"skipped","reason":"duplicate"}"#);

        let json = serde_json::to_string(&AttemptOutcome::RateLimited).unwrap();
        assert_eq!(json, r#"{"status":"rate_limited"}"#);
    }

    #[test]
    fn test_attempt_durations_stored_in_millis() {
        let a = attempt(AttemptOutcome::RateLimited).with_retry_after(Duration::from_secs(90));
        assert_eq!(a.retry_after_ms, Some(90_000));
        assert_eq!(a.retry_after(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_attempt_json_line_round_trip() {
        let a = attempt(AttemptOutcome::Failed)
            .with_error(SubmitErrorKind::Server, "502 bad gateway")
            .with_backoff(Duration::from_secs(2));
        let line = serde_json::to_string(&a).unwrap();
        let parsed: SubmissionAttempt = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn test_dispatch_result_queries() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert("x".into(), attempt(AttemptOutcome::Success));
        outcomes.insert("y".into(), attempt(AttemptOutcome::Failed));
        let result = DispatchResult {
            content_id: "item-1".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes,
        };

        assert_eq!(result.outcome("x"), Some(AttemptOutcome::Success));
        assert!(result.any_succeeded());
        assert!(!result.all_succeeded());
        assert_eq!(result.succeeded().len(), 1);
        assert_eq!(result.len(), 2);
    }
}
