//! InMemoryHistory - process-lifetime attempt log
//!
//! Also home of `SuccessIndex`, the duplicate-lookup structure shared by the
//! history backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use contracts::{ContentFingerprint, ContractError, DestinationId, History, SubmissionAttempt};

/// Latest success per `(destination, fingerprint)`
///
/// Sized by distinct published content rather than by attempt count, with
/// constant-time lookups.
#[derive(Debug, Default)]
pub(crate) struct SuccessIndex {
    latest: HashMap<DestinationId, HashMap<ContentFingerprint, SubmissionAttempt>>,
}

impl SuccessIndex {
    /// Keep `attempt` if it is a success newer than the one on file
    pub(crate) fn observe(&mut self, attempt: &SubmissionAttempt) {
        if !attempt.is_success() {
            return;
        }
        let by_fingerprint = self.latest.entry(attempt.destination.clone()).or_default();
        match by_fingerprint.get(&attempt.fingerprint) {
            Some(prior) if prior.timestamp >= attempt.timestamp => {}
            _ => {
                by_fingerprint.insert(attempt.fingerprint.clone(), attempt.clone());
            }
        }
    }

    /// Latest success at or after `since`
    pub(crate) fn find(
        &self,
        destination: &DestinationId,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Option<SubmissionAttempt> {
        self.latest
            .get(destination)?
            .get(fingerprint)
            .filter(|a| a.timestamp >= since)
            .cloned()
    }

    /// Distinct `(destination, fingerprint)` pairs with a success
    pub(crate) fn len(&self) -> usize {
        self.latest.values().map(HashMap::len).sum()
    }
}

/// Attempt log kept in memory
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    attempts: RwLock<Vec<SubmissionAttempt>>,
    successes: RwLock<SuccessIndex>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with already recorded attempts
    pub fn with_attempts(attempts: Vec<SubmissionAttempt>) -> Self {
        let mut successes = SuccessIndex::default();
        attempts.iter().for_each(|a| successes.observe(a));
        Self {
            attempts: RwLock::new(attempts),
            successes: RwLock::new(successes),
        }
    }

    /// Copy of every recorded attempt, in record order
    pub async fn attempts(&self) -> Vec<SubmissionAttempt> {
        self.attempts.read().await.clone()
    }

    /// Recorded attempts for one destination, in record order
    pub async fn attempts_for(&self, destination: &str) -> Vec<SubmissionAttempt> {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|a| a.destination == destination)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.attempts.read().await.is_empty()
    }
}

#[async_trait]
impl History for InMemoryHistory {
    async fn record(&self, attempt: SubmissionAttempt) -> Result<(), ContractError> {
        self.successes.write().await.observe(&attempt);
        self.attempts.write().await.push(attempt);
        Ok(())
    }

    async fn find_recent_success(
        &self,
        destination: &DestinationId,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Result<Option<SubmissionAttempt>, ContractError> {
        Ok(self
            .successes
            .read()
            .await
            .find(destination, fingerprint, since))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use contracts::AttemptOutcome;

    fn success(at: DateTime<Utc>, content_id: &str) -> SubmissionAttempt {
        SubmissionAttempt::new(
            "x".into(),
            ContentFingerprint::from_hex("aa"),
            content_id,
            1,
            at,
            AttemptOutcome::Success,
        )
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let history = InMemoryHistory::new();
        assert!(history.is_empty().await);
        history.record(success(Utc::now(), "a")).await.unwrap();
        assert_eq!(history.len().await, 1);
        assert_eq!(history.attempts_for("x").await.len(), 1);
        assert!(history.attempts_for("y").await.is_empty());
    }

    #[tokio::test]
    async fn test_find_recent_success_returns_latest() {
        let now = Utc::now();
        let history = InMemoryHistory::with_attempts(vec![
            success(now - TimeDelta::minutes(5), "newer"),
            success(now - TimeDelta::minutes(50), "older"),
        ]);
        let found = history
            .find_recent_success(
                &"x".into(),
                &ContentFingerprint::from_hex("aa"),
                now - TimeDelta::hours(1),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.content_id, "newer");
    }

    #[test]
    fn test_success_index_keeps_latest_success_only() {
        let now = Utc::now();
        let mut index = SuccessIndex::default();
        index.observe(&success(now - TimeDelta::minutes(5), "newer"));
        index.observe(&success(now - TimeDelta::minutes(50), "older"));
        let mut failed = success(now, "failed");
        failed.outcome = AttemptOutcome::Failed;
        index.observe(&failed);

        assert_eq!(index.len(), 1);
        let fp = ContentFingerprint::from_hex("aa");
        let found = index.find(&"x".into(), &fp, now - TimeDelta::hours(1)).unwrap();
        assert_eq!(found.content_id, "newer");
        assert!(index.find(&"x".into(), &fp, now - TimeDelta::minutes(1)).is_none());
        assert!(index.find(&"y".into(), &fp, now - TimeDelta::hours(1)).is_none());
    }
}
