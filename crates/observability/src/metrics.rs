//! Fanout 指标收集模块
//!
//! 记录每次投递尝试、退避、限流与历史写入失败，并在内存中聚合
//! DispatchResult 生成摘要。

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{AttemptOutcome, DispatchResult};
use metrics::{counter, histogram};

/// 记录一次尝试的结果 (中间失败与终态都会记录)
pub fn record_attempt(destination: &str, outcome: &AttemptOutcome) {
    counter!(
        "fanout_attempts_total",
        "destination" => destination.to_string(),
        "outcome" => outcome.label()
    )
    .increment(1);

    if let AttemptOutcome::Skipped(reason) = outcome {
        counter!(
            "fanout_skipped_total",
            "destination" => destination.to_string(),
            "reason" => reason.as_str()
        )
        .increment(1);
    }
}

/// 记录重试前的退避时长
pub fn record_backoff(destination: &str, backoff: Duration) {
    histogram!(
        "fanout_backoff_ms",
        "destination" => destination.to_string()
    )
    .record(backoff.as_secs_f64() * 1000.0);
}

/// 记录准入被拒绝 (retry_after 为建议等待时长)
pub fn record_rate_limited(destination: &str, retry_after: Duration) {
    counter!(
        "fanout_rate_limited_total",
        "destination" => destination.to_string()
    )
    .increment(1);
    histogram!(
        "fanout_retry_after_ms",
        "destination" => destination.to_string()
    )
    .record(retry_after.as_secs_f64() * 1000.0);
}

/// 记录一次 dispatch 调用的总耗时
pub fn record_dispatch_duration(elapsed: Duration, destinations: usize) {
    counter!("fanout_dispatches_total").increment(1);
    histogram!("fanout_dispatch_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
    histogram!("fanout_dispatch_destinations").record(destinations as f64);
}

/// 记录历史写入失败
pub fn record_history_write_failure(destination: &str) {
    counter!(
        "fanout_history_write_failures_total",
        "destination" => destination.to_string()
    )
    .increment(1);
}

/// 单个目标的终态计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationTally {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub rate_limited: u64,
    /// 终态记录上的 attempt_number 之和
    pub attempts: u64,
}

impl DestinationTally {
    fn observe(&mut self, outcome: &AttemptOutcome, attempt_number: u32) {
        match outcome {
            AttemptOutcome::Success => self.success += 1,
            AttemptOutcome::Failed => self.failed += 1,
            AttemptOutcome::Skipped(_) => self.skipped += 1,
            AttemptOutcome::RateLimited => self.rate_limited += 1,
        }
        self.attempts += u64::from(attempt_number);
    }

    /// 终态总数
    pub fn total(&self) -> u64 {
        self.success + self.failed + self.skipped + self.rate_limited
    }
}

/// Dispatch 结果聚合器
///
/// 在内存中聚合 DispatchResult，便于 CLI 输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DispatchMetricsAggregator {
    /// dispatch 调用次数
    pub total_dispatches: u64,

    /// 至少一个目标成功的调用次数
    pub dispatches_with_success: u64,

    /// 调用耗时统计 (毫秒)
    pub duration_stats: RunningStats,

    /// 各目标终态计数
    pub destinations: BTreeMap<String, DestinationTally>,
}

impl DispatchMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: &DispatchResult) {
        self.total_dispatches += 1;
        if result.any_succeeded() {
            self.dispatches_with_success += 1;
        }

        let elapsed_ms = (result.finished_at - result.started_at).num_milliseconds().max(0);
        self.duration_stats.push(elapsed_ms as f64);

        for (destination, attempt) in result.iter() {
            self.destinations
                .entry(destination.to_string())
                .or_default()
                .observe(&attempt.outcome, attempt.attempt_number);
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DispatchSummary {
        DispatchSummary {
            total_dispatches: self.total_dispatches,
            dispatches_with_success: self.dispatches_with_success,
            success_rate: if self.total_dispatches > 0 {
                self.dispatches_with_success as f64 / self.total_dispatches as f64 * 100.0
            } else {
                0.0
            },
            duration_ms: StatsSummary::from(&self.duration_stats),
            destinations: self.destinations.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub total_dispatches: u64,
    pub dispatches_with_success: u64,
    pub success_rate: f64,
    pub duration_ms: StatsSummary,
    pub destinations: BTreeMap<String, DestinationTally>,
}

impl std::fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Dispatch Summary ===")?;
        writeln!(f, "Dispatches: {}", self.total_dispatches)?;
        writeln!(
            f,
            "With at least one success: {} ({:.2}%)",
            self.dispatches_with_success, self.success_rate
        )?;
        writeln!(f, "Duration (ms): {}", self.duration_ms)?;

        if !self.destinations.is_empty() {
            writeln!(f, "Destinations:")?;
            for (name, tally) in &self.destinations {
                writeln!(
                    f,
                    "  {}: success={} failed={} skipped={} rate_limited={} attempts={}",
                    name, tally.success, tally.failed, tally.skipped, tally.rate_limited, tally.attempts
                )?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
