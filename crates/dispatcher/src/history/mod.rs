//! History backends
//!
//! Contains InMemoryHistory and JsonlHistory.

mod jsonl;
mod memory;

pub use self::jsonl::JsonlHistory;
pub use self::memory::InMemoryHistory;

use std::sync::Arc;
use tracing::instrument;

use contracts::{History, HistoryBackend, HistoryConfig};

use crate::error::DispatcherError;

/// Open the configured history backend
#[instrument(name = "history_open", skip(config), fields(backend = ?config.backend))]
pub async fn open_history(config: &HistoryConfig) -> Result<Arc<dyn History>, DispatcherError> {
    match config.backend {
        HistoryBackend::Memory => Ok(Arc::new(InMemoryHistory::new())),
        HistoryBackend::Jsonl => {
            let path = config.path.as_deref().ok_or_else(|| {
                DispatcherError::HistoryOpen("jsonl backend requires a path".to_string())
            })?;
            let history = JsonlHistory::open(path)
                .await
                .map_err(|e| DispatcherError::HistoryOpen(e.to_string()))?;
            Ok(Arc::new(history))
        }
    }
}
