//! History trait - durable attempt log
//!
//! Append-only. Implementations must tolerate concurrent `record` calls from
//! different destination tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{ContractError, ContentFingerprint, DestinationId, SubmissionAttempt};

/// Attempt log consumed by the dispatcher
#[async_trait]
pub trait History: Send + Sync {
    /// Append one attempt
    ///
    /// # Errors
    /// Returns a history error if the record could not be persisted.
    async fn record(&self, attempt: SubmissionAttempt) -> Result<(), ContractError>;

    /// Most recent `Success` for `(destination, fingerprint)` recorded at or
    /// after `since`
    async fn find_recent_success(
        &self,
        destination: &DestinationId,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Result<Option<SubmissionAttempt>, ContractError>;
}
