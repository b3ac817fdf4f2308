//! # Dispatcher
//!
//! 多目标分发引擎。
//!
//! 负责：
//! - 按目标的速率限制 (`RateLimiter`)
//! - 基于内容指纹的去重 (`DuplicateGuard`)
//! - 失败重试与指数退避 (`RetryPolicy`)
//! - 并行 fan-out 到多个目标，单个目标失败不影响其他目标 (`DispatchEngine`)
//!
//! ```no_run
//! # async fn demo() -> Result<(), dispatcher::DispatcherError> {
//! use std::sync::Arc;
//! use contracts::{ContentItem, DestinationPolicy};
//! use dispatcher::{DispatchEngineBuilder, LogDestination};
//!
//! let engine = DispatchEngineBuilder::new()
//!     .destination("dry-run", Arc::new(LogDestination::new("dry-run")), DestinationPolicy::default())
//!     .build()?;
//!
//! let item = ContentItem::new("post-1", "Hello").with_source_url("https://example.com/1");
//! let result = engine.dispatch_all(&item).await?;
//! println!("succeeded: {:?}", result.succeeded());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod clock;
pub mod destinations;
pub mod duplicate_guard;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod history;
pub mod metrics;
pub mod mock;
pub mod rate_limiter;
pub mod retry;

pub use builder::{create_client, create_engine, DispatchEngineBuilder};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use contracts::{ContentItem, DispatchResult, SubmissionAttempt};
pub use destinations::{FileDestination, LogDestination, WebhookDestination};
pub use duplicate_guard::{DuplicateCheck, DuplicateGuard};
pub use engine::DispatchEngine;
pub use error::DispatcherError;
pub use formatter::{FormatRules, PassthroughFormatter};
pub use history::{open_history, InMemoryHistory, JsonlHistory};
pub use metrics::{DestinationMetrics, MetricsSnapshot};
pub use mock::{FlakyHistory, ScriptedDestination};
pub use rate_limiter::{AdmissionSlot, AdmitDecision, DenyReason, RateLimiter, RateLimiterState};
pub use retry::{RetryDecision, RetryPolicy};
