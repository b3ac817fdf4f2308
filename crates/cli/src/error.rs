//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Neither an item file nor a body was given
    #[error("No content given: pass --item, --body or --body-file")]
    NoContent,

    /// Item file could not be parsed
    #[error("Invalid content item in {path}: {message}")]
    InvalidItem { path: String, message: String },

    /// At least one destination ended in a terminal failure
    #[error("Publishing failed for {}", .destinations.join(", "))]
    PublishFailed { destinations: Vec<String> },

    /// A signal cut the dispatch short; unfinished destinations were skipped
    #[error("Interrupted: dispatch was cut short")]
    Interrupted,
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_item(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidItem {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_failed_lists_destinations() {
        let err = CliError::PublishFailed {
            destinations: vec!["devto".into(), "reddit".into()],
        };
        assert_eq!(err.to_string(), "Publishing failed for devto, reddit");
    }
}
