//! Layered error definitions
//!
//! Categorized by source: config / history / format

use thiserror::Error;

/// Unified error type for collaborators outside a single submission
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== History Errors =====
    /// Attempt could not be persisted
    #[error("history write error: {message}")]
    HistoryWrite { message: String },

    /// History could not be queried
    #[error("history read error: {message}")]
    HistoryRead { message: String },

    /// Stored record could not be decoded
    #[error("history record at line {line} is corrupt: {message}")]
    HistoryCorrupt { line: usize, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create history write error
    pub fn history_write(message: impl Into<String>) -> Self {
        Self::HistoryWrite {
            message: message.into(),
        }
    }

    /// Create history read error
    pub fn history_read(message: impl Into<String>) -> Self {
        Self::HistoryRead {
            message: message.into(),
        }
    }
}
