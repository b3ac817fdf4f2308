//! Dispatcher error types
//!
//! Only engine-level problems live here. Per-destination failures are
//! outcomes in the `DispatchResult`, never errors.

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A dispatch call named a destination the engine does not know
    #[error("unknown destination '{0}'")]
    UnknownDestination(String),

    /// Destination registered twice
    #[error("destination '{0}' is already registered")]
    DuplicateDestination(String),

    /// Client creation error
    #[error("failed to create client for destination '{name}': {message}")]
    ClientCreation { name: String, message: String },

    /// History backend could not be opened
    #[error("failed to open history: {0}")]
    HistoryOpen(String),

    /// Contract error (config, history)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a client creation error
    pub fn client_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClientCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an unknown destination error
    pub fn unknown_destination(name: impl Into<String>) -> Self {
        Self::UnknownDestination(name.into())
    }
}
