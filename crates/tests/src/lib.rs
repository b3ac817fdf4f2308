//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试 (DispatchResult / 历史记录的 JSON 形态)
//! - 配置 -> 引擎 -> 文件发件箱 -> JSONL 历史的端到端测试
//! - 限流、去重、重试、截止时间的场景测试

#[cfg(test)]
mod contract_tests {
    use contracts::{
        AttemptOutcome, ContentFingerprint, DestinationId, SkipReason, SubmissionAttempt,
        SubmitErrorKind,
    };
    use std::time::Duration;

    #[test]
    fn test_attempt_json_shape() {
        let attempt = SubmissionAttempt::new(
            DestinationId::from("devto"),
            ContentFingerprint::from_hex("abc123"),
            "post-1",
            2,
            chrono::Utc::now(),
            AttemptOutcome::Failed,
        )
        .with_error(SubmitErrorKind::Throttled, "HTTP 429")
        .with_backoff(Duration::from_secs(2));

        let value = serde_json::to_value(&attempt).unwrap();
        assert_eq!(value["destination"], "devto");
        assert_eq!(value["outcome"]["status"], "failed");
        assert_eq!(value["error_kind"], "throttled");
        assert_eq!(value["backoff_ms"], 2000);
        assert!(value.get("retry_after_ms").is_none());
    }

    #[test]
    fn test_skip_reason_json_shape() {
        let value =
            serde_json::to_value(AttemptOutcome::Skipped(SkipReason::DeadlineExceeded)).unwrap();
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "deadline_exceeded");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        AttemptOutcome, ContentItem, DestinationId, DestinationPolicy, History, RateLimits,
        RetrySettings, SkipReason, SubmitError, SubmitErrorKind,
    };
    use dispatcher::{
        create_engine, DispatchEngineBuilder, InMemoryHistory, JsonlHistory, ScriptedDestination,
        TokioClock,
    };
    use observability::DispatchMetricsAggregator;

    fn config(dir: &Path) -> String {
        format!(
            r#"
[defaults]
max_per_hour = 1
min_interval_secs = 0

[[destinations]]
id = "devto"
client = "file"
params = {{ path = "{outbox}" }}

[[destinations]]
id = "mastodon"
client = "log"
max_length = 20

[history]
backend = "jsonl"
path = "{history}"
"#,
            outbox = dir.join("outbox").display(),
            history = dir.join("history.jsonl").display(),
        )
    }

    fn item(id: &str, url: &str) -> ContentItem {
        ContentItem::new(id, "Shipping the new release")
            .with_title("Release notes")
            .with_source_url(url)
    }

    fn ids(names: &[&str]) -> Vec<DestinationId> {
        names.iter().map(|n| DestinationId::from(*n)).collect()
    }

    fn policy(max_attempts: u32) -> DestinationPolicy {
        DestinationPolicy {
            limits: RateLimits {
                max_per_hour: 50,
                max_per_day: 500,
                min_interval: Duration::ZERO,
                cooldown_after_failure: Duration::ZERO,
            },
            retry: RetrySettings {
                max_attempts,
                backoff_base: Duration::from_millis(500),
            },
            ..DestinationPolicy::default()
        }
    }

    /// Config -> engine -> file outbox + JSONL history, then a restart with the
    /// same history file still recognises the item as already published
    #[tokio::test]
    async fn test_e2e_config_to_outbox_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = ConfigLoader::load_from_str(&config(dir.path()), ConfigFormat::Toml).unwrap();

        let engine = create_engine(&blueprint).await.unwrap();
        let result = engine
            .dispatch_all(&item("post-1", "https://blog.example.com/release"))
            .await
            .unwrap();

        assert_eq!(result.outcome("devto"), Some(AttemptOutcome::Success));
        // body is 24 chars, mastodon accepts 20
        let mastodon = result.get("mastodon").unwrap();
        assert_eq!(mastodon.outcome, AttemptOutcome::Failed);
        assert_eq!(mastodon.error_kind, Some(SubmitErrorKind::ContentTooLong));

        let outbox = std::fs::read_to_string(dir.path().join("outbox").join("devto.jsonl")).unwrap();
        assert_eq!(outbox.lines().count(), 1);
        assert!(outbox.contains("Shipping the new release"));
        drop(engine);

        // restart: new engine, same history file, tracking params ignored
        let engine = create_engine(&blueprint).await.unwrap();
        let again = engine
            .dispatch(
                &item("post-1-retry", "https://blog.example.com/release?utm_source=feed"),
                &ids(&["devto"]),
            )
            .await
            .unwrap();
        assert_eq!(
            again.outcome("devto"),
            Some(AttemptOutcome::Skipped(SkipReason::Duplicate))
        );
        let outbox = std::fs::read_to_string(dir.path().join("outbox").join("devto.jsonl")).unwrap();
        assert_eq!(outbox.lines().count(), 1);

        let history = JsonlHistory::open(&dir.path().join("history.jsonl")).await.unwrap();
        assert_eq!(history.attempts().await.unwrap().len(), 3);
    }

    /// maxPerHour = 1: the second item inside the hour is rate limited with
    /// roughly an hour to wait
    #[tokio::test]
    async fn test_e2e_hourly_cap() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = ConfigLoader::load_from_str(&config(dir.path()), ConfigFormat::Toml).unwrap();
        let engine = create_engine(&blueprint).await.unwrap();

        let a = engine
            .dispatch(&item("a", "https://blog.example.com/a"), &ids(&["devto"]))
            .await
            .unwrap();
        assert_eq!(a.outcome("devto"), Some(AttemptOutcome::Success));

        let b = engine
            .dispatch(&item("b", "https://blog.example.com/b"), &ids(&["devto"]))
            .await
            .unwrap();
        let attempt = b.get("devto").unwrap();
        assert_eq!(attempt.outcome, AttemptOutcome::RateLimited);
        let retry_after = attempt.retry_after().unwrap();
        assert!(retry_after > Duration::from_secs(3500), "{retry_after:?}");
        assert!(retry_after <= Duration::from_secs(3600));

        let state = engine.rate_limit_state(&"devto".into()).await.unwrap();
        assert_eq!(state.hourly_count(), 1);
    }

    /// Attempts never exceed the budget and backoffs strictly increase
    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_and_increasing_backoff() {
        for max_attempts in 1..=4u32 {
            let history = Arc::new(InMemoryHistory::new());
            let client = Arc::new(
                ScriptedDestination::new("reddit")
                    .then_fail_times(10, SubmitError::server("502 bad gateway")),
            );
            let engine = DispatchEngineBuilder::new()
                .history(history.clone())
                .clock(Arc::new(TokioClock::default()))
                .destination("reddit", client.clone(), policy(max_attempts))
                .build()
                .unwrap();

            let result = engine
                .dispatch(&item("p", "https://blog.example.com/p"), &ids(&["reddit"]))
                .await
                .unwrap();
            let attempt = result.get("reddit").unwrap();
            assert_eq!(attempt.outcome, AttemptOutcome::Failed);
            assert_eq!(attempt.attempt_number, max_attempts);
            assert_eq!(client.submit_count(), max_attempts as usize);

            let backoffs: Vec<Duration> = history
                .attempts_for("reddit")
                .await
                .iter()
                .filter_map(|a| a.backoff())
                .collect();
            assert_eq!(backoffs.len(), max_attempts as usize - 1);
            assert!(backoffs.windows(2).all(|w| w[1] > w[0]), "{backoffs:?}");
        }
    }

    /// X fails transiently twice, Y succeeds at once; neither affects the other
    #[tokio::test(start_paused = true)]
    async fn test_independent_destinations() {
        let x = Arc::new(
            ScriptedDestination::new("x")
                .then_fail_times(2, SubmitError::new(SubmitErrorKind::Throttled, "HTTP 429"))
                .then_succeed("x-42"),
        );
        let y = Arc::new(ScriptedDestination::new("y").then_succeed("y-1"));
        let engine = DispatchEngineBuilder::new()
            .clock(Arc::new(TokioClock::default()))
            .destination("x", x.clone(), policy(3))
            .destination("y", y.clone(), policy(3))
            .build()
            .unwrap();

        let result = engine
            .dispatch(&item("p", "https://blog.example.com/p"), &ids(&["x", "y"]))
            .await
            .unwrap();

        let x_attempt = result.get("x").unwrap();
        assert_eq!(x_attempt.outcome, AttemptOutcome::Success);
        assert_eq!(x_attempt.attempt_number, 3);
        assert_eq!(x_attempt.destination_post_id.as_deref(), Some("x-42"));
        let y_attempt = result.get("y").unwrap();
        assert_eq!(y_attempt.outcome, AttemptOutcome::Success);
        assert_eq!(y_attempt.attempt_number, 1);

        let mut aggregator = DispatchMetricsAggregator::new();
        aggregator.update(&result);
        let summary = aggregator.summary();
        assert_eq!(summary.destinations["x"].attempts, 3);
        assert_eq!(summary.destinations["y"].success, 1);
    }

    /// A deadline never turns an already published destination into a failure
    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_success() {
        let history: Arc<dyn History> = Arc::new(InMemoryHistory::new());
        let slow_retry = DestinationPolicy {
            retry: RetrySettings {
                max_attempts: 3,
                backoff_base: Duration::from_secs(30),
            },
            ..policy(3)
        };
        let engine = DispatchEngineBuilder::new()
            .history(Arc::clone(&history))
            .clock(Arc::new(TokioClock::default()))
            .destination("fast", Arc::new(ScriptedDestination::new("fast")), policy(3))
            .destination(
                "flaky",
                Arc::new(ScriptedDestination::new("flaky").then_fail(SubmitError::network("reset"))),
                slow_retry,
            )
            .build()
            .unwrap();

        let result = engine
            .dispatch_with_deadline(
                &item("p", "https://blog.example.com/p"),
                &ids(&["fast", "flaky"]),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert_eq!(result.outcome("fast"), Some(AttemptOutcome::Success));
        let flaky = result.get("flaky").unwrap();
        assert_eq!(flaky.outcome, AttemptOutcome::Failed);
        assert_eq!(flaky.error_kind, Some(SubmitErrorKind::Timeout));
        assert!(result.any_succeeded());
        assert!(!result.all_succeeded());
    }

    /// Unknown destinations fail the whole call before anything is submitted
    #[tokio::test]
    async fn test_unknown_destination_is_engine_error() {
        let client = Arc::new(ScriptedDestination::new("x"));
        let engine = DispatchEngineBuilder::new()
            .destination("x", client.clone(), policy(1))
            .build()
            .unwrap();

        let err = engine
            .dispatch(&item("p", "https://blog.example.com/p"), &ids(&["x", "hackernews"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("hackernews"));
        assert_eq!(client.submit_count(), 0);
    }
}
