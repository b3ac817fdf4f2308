//! FileDestination - appends payloads to a JSON-lines outbox

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use contracts::{DestinationClient, Payload, SubmitError, SubmitReceipt};

/// Configuration for FileDestination
#[derive(Debug, Clone)]
pub struct FileDestinationConfig {
    /// Outbox directory; one `<name>.jsonl` file per destination
    pub base_path: PathBuf,
}

impl FileDestinationConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./outbox"));

        Self { base_path }
    }
}

#[derive(Serialize)]
struct OutboxRecord<'a> {
    destination: &'a str,
    sequence: u64,
    submitted_at: DateTime<Utc>,
    payload: &'a Payload,
}

/// Destination that writes each payload as one JSON line
pub struct FileDestination {
    name: String,
    path: PathBuf,
    /// Records written so far; guards the append
    sequence: Mutex<u64>,
}

impl FileDestination {
    /// Create a new FileDestination, creating the outbox directory.
    ///
    /// Numbering continues after the records already in the outbox.
    pub fn new(name: impl Into<String>, config: FileDestinationConfig) -> std::io::Result<Self> {
        let name = name.into();
        std::fs::create_dir_all(&config.base_path)?;
        let path = config.base_path.join(format!("{name}.jsonl"));

        let written = match std::fs::read(&path) {
            Ok(bytes) => bytes.iter().filter(|b| **b == b'\n').count() as u64,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        debug!(destination = %name, written, "Outbox opened");

        Ok(Self {
            name,
            path,
            sequence: Mutex::new(written),
        })
    }

    /// Create from destination params
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileDestinationConfig::from_params(params);
        Self::new(name, config)
    }

    /// Outbox file
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn append(&self, line: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line).await?;
        file.flush().await
    }
}

#[async_trait]
impl DestinationClient for FileDestination {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_destination_submit",
        skip(self, payload),
        fields(destination = %self.name)
    )]
    async fn submit(&self, payload: &Payload) -> Result<SubmitReceipt, SubmitError> {
        let mut sequence = self.sequence.lock().await;
        let next = *sequence + 1;

        let record = OutboxRecord {
            destination: &self.name,
            sequence: next,
            submitted_at: Utc::now(),
            payload,
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| SubmitError::validation(format!("payload not serializable: {e}")))?;
        line.push(b'\n');

        if let Err(e) = self.append(&line).await {
            error!(destination = %self.name, path = %self.path.display(), error = %e, "Outbox write failed");
            return Err(SubmitError::network(format!("outbox write failed: {e}")));
        }

        *sequence = next;
        debug!(destination = %self.name, sequence = next, "Payload written to outbox");
        Ok(SubmitReceipt {
            post_id: Some(next.to_string()),
            url: Some(self.path.display().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_destination_appends_lines() {
        let dir = tempdir().unwrap();
        let config = FileDestinationConfig {
            base_path: dir.path().join("outbox"),
        };
        let destination = FileDestination::new("devto", config).unwrap();

        let first = destination.submit(&Payload::text("one")).await.unwrap();
        let second = destination.submit(&Payload::text("two")).await.unwrap();
        assert_eq!(first.post_id.as_deref(), Some("1"));
        assert_eq!(second.post_id.as_deref(), Some("2"));

        let content = std::fs::read_to_string(destination.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["payload"]["body"], "two");
        assert_eq!(lines[0]["destination"], "devto");
    }

    #[tokio::test]
    async fn test_sequence_continues_across_restarts() {
        let dir = tempdir().unwrap();
        let config = FileDestinationConfig {
            base_path: dir.path().to_path_buf(),
        };

        {
            let destination = FileDestination::new("devto", config.clone()).unwrap();
            destination.submit(&Payload::text("one")).await.unwrap();
            destination.submit(&Payload::text("two")).await.unwrap();
        }

        let restarted = FileDestination::new("devto", config).unwrap();
        let receipt = restarted.submit(&Payload::text("three")).await.unwrap();
        assert_eq!(receipt.post_id.as_deref(), Some("3"));
    }
}
