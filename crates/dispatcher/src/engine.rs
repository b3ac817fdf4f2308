//! DispatchEngine - fans one content item out to N destinations
//!
//! One task per requested destination. Each task walks the same state
//! machine independently:
//!
//! ```text
//! Pending -> Skipped | RateLimited | Failed | Success
//!              (retrying loop bounded by max_attempts)
//! ```
//!
//! The admission slot is held from the duplicate check through
//! `record_success` and the history write, so two concurrent calls can never
//! both publish the same item to the same destination or overrun a cap.
//!
//! Waits (slot, admission, backoff) end at the dispatch cutoff: the deadline
//! or an external cancellation, whichever comes first. A submit already in
//! flight is always allowed to finish and be recorded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    AttemptOutcome, ContentFingerprint, ContentFormatter, ContentItem, DestinationClient,
    DestinationId, DestinationPolicy, DispatchResult, History, SkipReason, SubmissionAttempt,
    SubmitErrorKind,
};

use crate::clock::Clock;
use crate::duplicate_guard::DuplicateGuard;
use crate::error::DispatcherError;
use crate::metrics::{DestinationMetrics, MetricsSnapshot};
use crate::rate_limiter::{AdmissionSlot, DenyReason, RateLimiter, RateLimiterState};
use crate::retry::RetryPolicy;

/// A registered destination
pub(crate) struct Destination {
    pub(crate) id: DestinationId,
    pub(crate) client: Arc<dyn DestinationClient>,
    pub(crate) policy: DestinationPolicy,
    pub(crate) retry: RetryPolicy,
    pub(crate) metrics: Arc<DestinationMetrics>,
}

pub(crate) struct EngineInner {
    pub(crate) destinations: HashMap<DestinationId, Destination>,
    pub(crate) limiter: RateLimiter,
    pub(crate) guard: DuplicateGuard,
    pub(crate) history: Arc<dyn History>,
    pub(crate) formatter: Arc<dyn ContentFormatter>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) default_deadline: Option<Duration>,
}

/// Multi-destination dispatcher
///
/// Cheap to clone; clones share rate-limiter state, history and metrics.
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

impl DispatchEngine {
    pub(crate) fn from_inner(inner: EngineInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Publish `item` to `destinations` using the configured default deadline
    ///
    /// # Errors
    /// Only when a requested destination is not registered; per-destination
    /// problems are outcomes in the result.
    pub async fn dispatch(
        &self,
        item: &ContentItem,
        destinations: &[DestinationId],
    ) -> Result<DispatchResult, DispatcherError> {
        self.dispatch_until_cancelled(item, destinations, CancellationToken::new())
            .await
    }

    /// Like `dispatch`, but cancelling `cancel` brings the deadline forward
    /// to now. Every destination still records its terminal outcome before
    /// this returns.
    pub async fn dispatch_until_cancelled(
        &self,
        item: &ContentItem,
        destinations: &[DestinationId],
        cancel: CancellationToken,
    ) -> Result<DispatchResult, DispatcherError> {
        let cutoff = Cutoff {
            deadline: self.inner.default_deadline.map(|d| Instant::now() + d),
            cancel,
        };
        self.run(item, destinations, cutoff).await
    }

    /// Publish `item` to `destinations`, giving up on unfinished work after
    /// `deadline`
    pub async fn dispatch_with_deadline(
        &self,
        item: &ContentItem,
        destinations: &[DestinationId],
        deadline: Duration,
    ) -> Result<DispatchResult, DispatcherError> {
        let cutoff = Cutoff {
            deadline: Some(Instant::now() + deadline),
            cancel: CancellationToken::new(),
        };
        self.run(item, destinations, cutoff).await
    }

    /// Publish `item` to every registered destination
    pub async fn dispatch_all(&self, item: &ContentItem) -> Result<DispatchResult, DispatcherError> {
        let destinations = self.destinations();
        self.dispatch(item, &destinations).await
    }

    /// Registered destinations in name order
    pub fn destinations(&self) -> Vec<DestinationId> {
        let mut ids: Vec<_> = self.inner.destinations.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolved policy of one destination
    pub fn policy(&self, destination: &str) -> Option<&DestinationPolicy> {
        self.inner.destinations.get(destination).map(|d| &d.policy)
    }

    /// Metrics for all destinations, in name order
    pub fn metrics(&self) -> Vec<(DestinationId, MetricsSnapshot)> {
        let mut metrics: Vec<_> = self
            .inner
            .destinations
            .values()
            .map(|d| (d.id.clone(), d.metrics.snapshot()))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        metrics
    }

    /// Current admission state of one destination
    pub async fn rate_limit_state(
        &self,
        destination: &DestinationId,
    ) -> Result<RateLimiterState, DispatcherError> {
        self.inner.limiter.snapshot(destination).await
    }

    /// Admission control
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Attempt history
    pub fn history(&self) -> &Arc<dyn History> {
        &self.inner.history
    }

    #[instrument(
        name = "dispatch",
        skip(self, item, destinations, cutoff),
        fields(content_id = %item.id, destinations = destinations.len())
    )]
    async fn run(
        &self,
        item: &ContentItem,
        destinations: &[DestinationId],
        cutoff: Cutoff,
    ) -> Result<DispatchResult, DispatcherError> {
        let requested: BTreeSet<&DestinationId> = destinations.iter().collect();
        if let Some(unknown) = requested
            .iter()
            .find(|id| !self.inner.destinations.contains_key(id.as_str()))
        {
            return Err(DispatcherError::unknown_destination(unknown.as_str()));
        }

        let started_at = self.inner.clock.now();
        let timer = Instant::now();
        let item = Arc::new(item.clone());

        let tasks: Vec<(DestinationId, JoinHandle<SubmissionAttempt>)> = requested
            .into_iter()
            .map(|id| {
                let inner = Arc::clone(&self.inner);
                let item = Arc::clone(&item);
                let cutoff = cutoff.clone();
                let task_id = id.clone();
                let handle =
                    tokio::spawn(async move { inner.run_destination(&task_id, &item, &cutoff).await });
                (id.clone(), handle)
            })
            .collect();

        let mut outcomes = BTreeMap::new();
        for (id, handle) in tasks {
            let attempt = match handle.await {
                Ok(attempt) => attempt,
                Err(e) => self.inner.task_lost(&id, &item, &e.to_string()).await,
            };
            outcomes.insert(id, attempt);
        }

        let result = DispatchResult {
            content_id: item.id.clone(),
            started_at,
            finished_at: self.inner.clock.now(),
            outcomes,
        };

        observability::record_dispatch_duration(timer.elapsed(), result.len());
        info!(
            content_id = %result.content_id,
            destinations = result.len(),
            succeeded = result.succeeded().len(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Dispatch finished"
        );

        Ok(result)
    }
}

/// When waiting destinations give up
#[derive(Clone)]
struct Cutoff {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Cutoff {
    fn passed(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the cutoff has passed; pending forever without a
    /// deadline unless cancelled
    async fn reached(&self) {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {},
                _ = self.cancel.cancelled() => {},
            },
            None => self.cancel.cancelled().await,
        }
    }
}

/// Builds the attempt records of one destination task
struct AttemptTemplate {
    destination: DestinationId,
    fingerprint: ContentFingerprint,
    content_id: String,
}

impl AttemptTemplate {
    fn at(&self, clock: &dyn Clock, attempt_number: u32, outcome: AttemptOutcome) -> SubmissionAttempt {
        SubmissionAttempt::new(
            self.destination.clone(),
            self.fingerprint.clone(),
            self.content_id.clone(),
            attempt_number,
            clock.now(),
            outcome,
        )
    }
}

/// Admission slot acquisition result
enum Slot {
    Acquired(AdmissionSlot),
    DeadlineExceeded,
}

impl EngineInner {
    #[instrument(
        name = "dispatch_destination",
        skip(self, item, cutoff),
        fields(destination = %id, content_id = %item.id)
    )]
    async fn run_destination(
        &self,
        id: &DestinationId,
        item: &ContentItem,
        cutoff: &Cutoff,
    ) -> SubmissionAttempt {
        // registration is checked before tasks are spawned
        let Some(dest) = self.destinations.get(id) else {
            return self.task_lost(id, item, "destination vanished").await;
        };
        let clock = self.clock.as_ref();
        let template = AttemptTemplate {
            destination: id.clone(),
            fingerprint: ContentFingerprint::for_destination(id, item),
            content_id: item.id.clone(),
        };

        let mut slot = match self.acquire_slot(dest, cutoff).await {
            Ok(Slot::Acquired(slot)) => slot,
            Ok(Slot::DeadlineExceeded) => {
                let attempt = template
                    .at(clock, 1, AttemptOutcome::Skipped(SkipReason::DeadlineExceeded))
                    .with_detail("dispatch deadline elapsed before the destination started");
                return self.finish(dest, attempt).await;
            }
            Err(e) => {
                let attempt = template
                    .at(clock, 1, AttemptOutcome::Failed)
                    .with_detail(e.to_string());
                return self.finish(dest, attempt).await;
            }
        };

        let lookback = dest.policy.duplicate_lookback;
        match self
            .guard
            .check_duplicate(id, &template.fingerprint, lookback, clock.now())
            .await
        {
            Ok(check) if check.is_duplicate => {
                let mut attempt =
                    template.at(clock, 1, AttemptOutcome::Skipped(SkipReason::Duplicate));
                if let Some(prior) = check.prior_success_at {
                    attempt = attempt.with_detail(format!(
                        "already published at {prior} (lookback {}s)",
                        check.within_window.as_secs()
                    ));
                }
                return self.finish(dest, attempt).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(destination = %id, error = %e, "Duplicate check unavailable, skipping");
                let attempt = template
                    .at(clock, 1, AttemptOutcome::Skipped(SkipReason::HistoryUnavailable))
                    .with_detail(e.to_string());
                return self.finish(dest, attempt).await;
            }
        }

        let payload = match self.formatter.format(id, item) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(destination = %id, error = %e, "Content cannot be formatted");
                let attempt = template
                    .at(clock, 1, AttemptOutcome::Failed)
                    .with_error(e.kind(), e.to_string());
                return self.finish(dest, attempt).await;
            }
        };

        let mut attempt_number = 1;
        let mut admission_waited = false;
        loop {
            let decision = slot.admit(clock.now());
            if !decision.allowed {
                let wait_allowed = !admission_waited
                    && decision.reason == Some(DenyReason::MinInterval)
                    && decision.retry_after <= dest.policy.admission_wait;

                if wait_allowed {
                    admission_waited = true;
                    drop(slot);
                    debug!(
                        destination = %id,
                        wait_ms = decision.retry_after.as_millis() as u64,
                        "Waiting out minimum interval"
                    );
                    let reacquired = if sleep_within_cutoff(decision.retry_after, cutoff).await {
                        self.acquire_slot(dest, cutoff).await
                    } else {
                        Ok(Slot::DeadlineExceeded)
                    };
                    slot = match reacquired {
                        Ok(Slot::Acquired(slot)) => slot,
                        Ok(Slot::DeadlineExceeded) => {
                            return self
                                .deadline_outcome(dest, &template, attempt_number)
                                .await
                        }
                        Err(e) => {
                            let attempt = template
                                .at(clock, attempt_number, AttemptOutcome::Failed)
                                .with_detail(e.to_string());
                            return self.finish(dest, attempt).await;
                        }
                    };
                    continue;
                }

                let reason = decision.reason.map(|r| r.as_str()).unwrap_or("denied");
                observability::record_rate_limited(id, decision.retry_after);
                let attempt = template
                    .at(clock, attempt_number, AttemptOutcome::RateLimited)
                    .with_retry_after(decision.retry_after)
                    .with_detail(format!("admission denied: {reason}"));
                return self.finish(dest, attempt).await;
            }

            match dest.client.submit(&payload).await {
                Ok(receipt) => {
                    slot.record_success(clock.now());
                    let attempt = template
                        .at(clock, attempt_number, AttemptOutcome::Success)
                        .with_post_id(receipt.post_id);
                    // history write happens before the slot is released
                    let attempt = self.finish(dest, attempt).await;
                    drop(slot);
                    return attempt;
                }
                Err(error) => {
                    let decision = dest.retry.should_retry(attempt_number, &error);
                    let attempt = template
                        .at(clock, attempt_number, AttemptOutcome::Failed)
                        .with_error(error.kind, error.message.clone());

                    if !decision.retry {
                        slot.record_failure(clock.now());
                        return self.finish(dest, attempt).await;
                    }

                    drop(slot);
                    dest.metrics.inc_retries();
                    observability::record_backoff(id, decision.backoff);
                    warn!(
                        destination = %id,
                        attempt = attempt_number,
                        kind = %error.kind,
                        backoff_ms = decision.backoff.as_millis() as u64,
                        "Transient failure, retrying"
                    );
                    self.record(dest, attempt.with_backoff(decision.backoff)).await;

                    if !sleep_within_cutoff(decision.backoff, cutoff).await {
                        return self.backoff_cancelled(dest, &template, attempt_number).await;
                    }
                    slot = match self.acquire_slot(dest, cutoff).await {
                        Ok(Slot::Acquired(slot)) => slot,
                        Ok(Slot::DeadlineExceeded) => {
                            return self.backoff_cancelled(dest, &template, attempt_number).await
                        }
                        Err(e) => {
                            let attempt = template
                                .at(clock, attempt_number, AttemptOutcome::Failed)
                                .with_detail(e.to_string());
                            return self.finish(dest, attempt).await;
                        }
                    };
                    attempt_number += 1;
                }
            }
        }
    }

    async fn acquire_slot(
        &self,
        dest: &Destination,
        cutoff: &Cutoff,
    ) -> Result<Slot, DispatcherError> {
        if cutoff.passed() {
            return Ok(Slot::DeadlineExceeded);
        }
        tokio::select! {
            slot = self.limiter.acquire(&dest.id) => slot.map(Slot::Acquired),
            _ = cutoff.reached() => Ok(Slot::DeadlineExceeded),
        }
    }

    /// Deadline hit while waiting for admission
    async fn deadline_outcome(
        &self,
        dest: &Destination,
        template: &AttemptTemplate,
        attempt_number: u32,
    ) -> SubmissionAttempt {
        if attempt_number == 1 {
            let attempt = template
                .at(
                    self.clock.as_ref(),
                    1,
                    AttemptOutcome::Skipped(SkipReason::DeadlineExceeded),
                )
                .with_detail("dispatch deadline elapsed before the destination was admitted");
            self.finish(dest, attempt).await
        } else {
            self.backoff_cancelled(dest, template, attempt_number - 1).await
        }
    }

    /// Deadline hit after at least one submission
    async fn backoff_cancelled(
        &self,
        dest: &Destination,
        template: &AttemptTemplate,
        attempt_number: u32,
    ) -> SubmissionAttempt {
        let attempt = template
            .at(self.clock.as_ref(), attempt_number, AttemptOutcome::Failed)
            .with_error(
                SubmitErrorKind::Timeout,
                "dispatch deadline elapsed while waiting to retry",
            );
        self.finish(dest, attempt).await
    }

    /// Terminal record for a task that panicked or was cancelled
    async fn task_lost(&self, id: &DestinationId, item: &ContentItem, detail: &str) -> SubmissionAttempt {
        error!(destination = %id, detail, "Destination task lost");
        let attempt = SubmissionAttempt::new(
            id.clone(),
            ContentFingerprint::for_destination(id, item),
            item.id.clone(),
            1,
            self.clock.now(),
            AttemptOutcome::Failed,
        )
        .with_detail(format!("destination task lost: {detail}"));
        match self.destinations.get(id) {
            Some(dest) => self.finish(dest, attempt).await,
            None => attempt,
        }
    }

    /// Record a terminal attempt and hand it back
    async fn finish(&self, dest: &Destination, attempt: SubmissionAttempt) -> SubmissionAttempt {
        self.record(dest, attempt.clone()).await;
        match attempt.outcome {
            AttemptOutcome::Success => info!(
                destination = %attempt.destination,
                attempt = attempt.attempt_number,
                post_id = attempt.destination_post_id.as_deref().unwrap_or(""),
                "Published"
            ),
            outcome => warn!(
                destination = %attempt.destination,
                attempt = attempt.attempt_number,
                outcome = %outcome,
                detail = attempt.error_detail.as_deref().unwrap_or(""),
                "Not published"
            ),
        }
        attempt
    }

    /// Append to history; a failed write is logged and counted but never
    /// hides the outcome from the caller
    async fn record(&self, dest: &Destination, attempt: SubmissionAttempt) {
        dest.metrics.observe(&attempt.outcome);
        observability::record_attempt(&attempt.destination, &attempt.outcome);

        let destination = attempt.destination.clone();
        let attempt_number = attempt.attempt_number;
        if let Err(e) = self.history.record(attempt).await {
            dest.metrics.inc_history_failures();
            observability::record_history_write_failure(&destination);
            error!(
                destination = %destination,
                attempt = attempt_number,
                error = %e,
                "Failed to record attempt in history"
            );
        }
    }
}

/// Sleep for `wait` unless the cutoff comes first. Returns false when the
/// cutoff cut the wait short.
async fn sleep_within_cutoff(wait: Duration, cutoff: &Cutoff) -> bool {
    match Instant::now().checked_add(wait) {
        Some(end) => tokio::select! {
            biased;
            _ = tokio::time::sleep_until(end) => true,
            _ = cutoff.reached() => false,
        },
        None => {
            cutoff.reached().await;
            false
        }
    }
}
