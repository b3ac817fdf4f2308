//! LogDestination - dry run, logs the payload via tracing

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, instrument};

use contracts::{DestinationClient, Payload, SubmitError, SubmitReceipt};

/// Destination that only logs what would have been published
pub struct LogDestination {
    name: String,
    submitted: AtomicU64,
}

impl LogDestination {
    /// Create a new LogDestination with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            submitted: AtomicU64::new(0),
        }
    }

    /// Payloads logged so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DestinationClient for LogDestination {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_destination_submit",
        skip(self, payload),
        fields(destination = %self.name)
    )]
    async fn submit(&self, payload: &Payload) -> Result<SubmitReceipt, SubmitError> {
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            destination = %self.name,
            title = payload.title.as_deref().unwrap_or(""),
            chars = payload.char_len(),
            link = payload.link.as_deref().unwrap_or(""),
            tags = payload.tags.len(),
            "Payload published (dry run)"
        );
        Ok(SubmitReceipt::with_post_id(format!("{}-{seq}", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_destination_submit() {
        let destination = LogDestination::new("dry");
        let receipt = destination.submit(&Payload::text("hello")).await.unwrap();
        assert_eq!(receipt.post_id.as_deref(), Some("dry-1"));
        assert_eq!(destination.submitted(), 1);
    }

    #[tokio::test]
    async fn test_log_destination_name() {
        let destination = LogDestination::new("my_logger");
        assert_eq!(destination.name(), "my_logger");
    }
}
