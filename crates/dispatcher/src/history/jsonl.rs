//! JsonlHistory - append-only JSON-lines attempt log
//!
//! One `SubmissionAttempt` per line. The file is replayed on open into an
//! index of the latest success per `(destination, fingerprint)`, so duplicate
//! detection survives restarts without holding every attempt in memory.
//! Appends are serialized through a single writer and flushed before
//! `record` returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use contracts::{ContentFingerprint, ContractError, DestinationId, History, SubmissionAttempt};

use super::memory::SuccessIndex;

/// File-backed attempt log
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    writer: Mutex<File>,
    index: RwLock<SuccessIndex>,
}

impl JsonlHistory {
    /// Open (or create) the log at `path` and load existing records.
    ///
    /// An unterminated final line (interrupted write) is cut off the file
    /// with a warning, or newline-terminated if it still decodes, so later
    /// appends start on a fresh line. Any other undecodable line is an error.
    #[instrument(name = "jsonl_history_open", skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, ContractError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let attempts = match fs::read(path).await {
            Ok(bytes) => Self::load(path, &bytes).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        let mut index = SuccessIndex::default();
        attempts.iter().for_each(|a| index.observe(a));
        info!(
            path = %path.display(),
            records = attempts.len(),
            successes = index.len(),
            "History loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every attempt in the log, read back from disk
    pub async fn attempts(&self) -> Result<Vec<SubmissionAttempt>, ContractError> {
        // no append can be half-written while the writer is held
        let _writer = self.writer.lock().await;
        let content = fs::read_to_string(&self.path).await?;
        Self::parse_lines(&content)
    }

    async fn load(path: &Path, bytes: &[u8]) -> Result<Vec<SubmissionAttempt>, ContractError> {
        let complete = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |idx| idx + 1);
        let mut attempts = Self::parse_lines(&String::from_utf8_lossy(&bytes[..complete]))?;

        let tail = &bytes[complete..];
        if tail.iter().all(u8::is_ascii_whitespace) {
            if !tail.is_empty() {
                Self::truncate(path, complete).await?;
            }
            return Ok(attempts);
        }

        let line = bytes[..complete].iter().filter(|b| **b == b'\n').count() + 1;
        match serde_json::from_slice::<SubmissionAttempt>(tail) {
            Ok(attempt) => {
                debug!(line, "Terminating history record written without newline");
                let mut file = OpenOptions::new().append(true).open(path).await?;
                file.write_all(b"\n").await?;
                file.flush().await?;
                attempts.push(attempt);
            }
            Err(e) => {
                warn!(line, bytes = tail.len(), error = %e, "Dropping truncated history record");
                Self::truncate(path, complete).await?;
            }
        }
        Ok(attempts)
    }

    async fn truncate(path: &Path, len: usize) -> Result<(), ContractError> {
        let file = OpenOptions::new().write(true).open(path).await?;
        file.set_len(len as u64).await?;
        file.sync_all().await?;
        Ok(())
    }

    fn parse_lines(content: &str) -> Result<Vec<SubmissionAttempt>, ContractError> {
        let mut attempts = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let attempt = serde_json::from_str::<SubmissionAttempt>(line).map_err(|e| {
                ContractError::HistoryCorrupt {
                    line: idx + 1,
                    message: e.to_string(),
                }
            })?;
            attempts.push(attempt);
        }
        Ok(attempts)
    }
}

#[async_trait]
impl History for JsonlHistory {
    #[instrument(
        name = "jsonl_history_record",
        skip(self, attempt),
        fields(destination = %attempt.destination, outcome = %attempt.outcome)
    )]
    async fn record(&self, attempt: SubmissionAttempt) -> Result<(), ContractError> {
        let mut line = serde_json::to_string(&attempt)
            .map_err(|e| ContractError::history_write(format!("encode: {e}")))?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ContractError::history_write(e.to_string()))?;
            writer
                .flush()
                .await
                .map_err(|e| ContractError::history_write(e.to_string()))?;
        }

        self.index.write().await.observe(&attempt);
        debug!(path = %self.path.display(), "History record appended");
        Ok(())
    }

    async fn find_recent_success(
        &self,
        destination: &DestinationId,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Result<Option<SubmissionAttempt>, ContractError> {
        Ok(self.index.read().await.find(destination, fingerprint, since))
    }
}
