//! Scripted test doubles
//!
//! `ScriptedDestination` replays a queue of submission results and records
//! every payload it receives. `FlakyHistory` wraps an in-memory history and
//! can be told to fail reads or writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use contracts::{
    ContentFingerprint, ContractError, DestinationClient, DestinationId, History, Payload,
    SubmissionAttempt, SubmitError, SubmitReceipt,
};

use crate::history::InMemoryHistory;

/// Destination client driven by a script of results
///
/// Once the script is exhausted every further submission succeeds.
pub struct ScriptedDestination {
    name: String,
    script: Mutex<VecDeque<Result<SubmitReceipt, SubmitError>>>,
    payloads: Mutex<Vec<Payload>>,
    delay: Option<Duration>,
}

impl ScriptedDestination {
    /// Destination that always succeeds
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            payloads: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Queue a failure
    pub fn then_fail(self, error: SubmitError) -> Self {
        self.push(Err(error));
        self
    }

    /// Queue `count` copies of the same failure
    pub fn then_fail_times(self, count: usize, error: SubmitError) -> Self {
        for _ in 0..count {
            self.push(Err(error.clone()));
        }
        self
    }

    /// Queue a success carrying `post_id`
    pub fn then_succeed(self, post_id: impl Into<String>) -> Self {
        self.push(Ok(SubmitReceipt::with_post_id(post_id)));
        self
    }

    /// Sleep (tokio time) inside every submission
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `submit` calls so far
    pub fn submit_count(&self) -> usize {
        self.payloads.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every payload received, in order
    pub fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, result: Result<SubmitReceipt, SubmitError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    fn next_result(&self) -> Result<SubmitReceipt, SubmitError> {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(SubmitReceipt::default()))
    }
}

#[async_trait]
impl DestinationClient for ScriptedDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, payload: &Payload) -> Result<SubmitReceipt, SubmitError> {
        self.payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_result()
    }
}

/// In-memory history with switchable failures
#[derive(Debug, Default)]
pub struct FlakyHistory {
    inner: InMemoryHistory,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `find_recent_success` fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `record` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Attempts that were recorded successfully
    pub async fn attempts(&self) -> Vec<SubmissionAttempt> {
        self.inner.attempts().await
    }
}

#[async_trait]
impl History for FlakyHistory {
    async fn record(&self, attempt: SubmissionAttempt) -> Result<(), ContractError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ContractError::history_write("storage offline"));
        }
        self.inner.record(attempt).await
    }

    async fn find_recent_success(
        &self,
        destination: &DestinationId,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Result<Option<SubmissionAttempt>, ContractError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ContractError::history_read("storage offline"));
        }
        self.inner
            .find_recent_success(destination, fingerprint, since)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SubmitErrorKind;

    #[tokio::test]
    async fn test_scripted_destination_replays_then_succeeds() {
        let destination = ScriptedDestination::new("x")
            .then_fail(SubmitError::server("502"))
            .then_succeed("p-1");

        let first = destination.submit(&Payload::text("a")).await.unwrap_err();
        assert_eq!(first.kind, SubmitErrorKind::Server);
        let second = destination.submit(&Payload::text("b")).await.unwrap();
        assert_eq!(second.post_id.as_deref(), Some("p-1"));
        assert!(destination.submit(&Payload::text("c")).await.is_ok());

        assert_eq!(destination.submit_count(), 3);
        assert_eq!(destination.payloads()[1].body, "b");
    }

    #[tokio::test]
    async fn test_flaky_history_switches() {
        let history = FlakyHistory::new();
        history.set_fail_writes(true);
        let attempt = SubmissionAttempt::new(
            "x".into(),
            ContentFingerprint::from_hex("aa"),
            "c",
            1,
            Utc::now(),
            contracts::AttemptOutcome::Success,
        );
        assert!(history.record(attempt.clone()).await.is_err());
        history.set_fail_writes(false);
        history.record(attempt).await.unwrap();
        assert_eq!(history.attempts().await.len(), 1);
    }
}
