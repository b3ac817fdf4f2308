//! DestinationClient trait - Dispatcher output interface
//!
//! One implementation per publishing target. The engine only ever sees
//! `Arc<dyn DestinationClient>`, so the trait is object safe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::Payload;

/// Classification of a failed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitErrorKind {
    /// Request timed out
    Timeout,
    /// Connection could not be established or was reset
    Network,
    /// Destination returned a server-side error (5xx)
    Server,
    /// Destination signalled its own rate limit (e.g. HTTP 429)
    Throttled,
    /// Credentials rejected
    Auth,
    /// Payload rejected (missing required field, bad format)
    Validation,
    /// Payload exceeds the destination's size limit
    ContentTooLong,
}

impl SubmitErrorKind {
    /// Whether retrying the same payload may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SubmitErrorKind::Timeout
                | SubmitErrorKind::Network
                | SubmitErrorKind::Server
                | SubmitErrorKind::Throttled
        )
    }

    /// Inverse of [`is_transient`](Self::is_transient)
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitErrorKind::Timeout => "timeout",
            SubmitErrorKind::Network => "network",
            SubmitErrorKind::Server => "server",
            SubmitErrorKind::Throttled => "throttled",
            SubmitErrorKind::Auth => "auth",
            SubmitErrorKind::Validation => "validation",
            SubmitErrorKind::ContentTooLong => "content_too_long",
        }
    }
}

impl fmt::Display for SubmitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed submission, classified for the retry policy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct SubmitError {
    /// Classification
    pub kind: SubmitErrorKind,
    /// Destination-provided or client-generated description
    pub message: String,
}

impl SubmitError {
    /// Create an error of the given kind
    pub fn new(kind: SubmitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Timeout, message)
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Network, message)
    }

    /// Create a server error
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Server, message)
    }

    /// Create a destination-throttled error
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Throttled, message)
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Auth, message)
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Validation, message)
    }

    /// Create a content-too-long error
    pub fn content_too_long(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::ContentTooLong, message)
    }

    /// Shortcut for `self.kind.is_transient()`
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Successful submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Id assigned by the destination
    pub post_id: Option<String>,
    /// Public URL of the created post
    pub url: Option<String>,
}

impl SubmitReceipt {
    /// Receipt carrying only a post id
    pub fn with_post_id(post_id: impl Into<String>) -> Self {
        Self {
            post_id: Some(post_id.into()),
            url: None,
        }
    }
}

/// Publishing capability of a single destination.
///
/// `submit` performs exactly one publish attempt; retries, admission control
/// and duplicate detection belong to the dispatcher.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Client name (used for logging)
    fn name(&self) -> &str;

    /// Publish one payload
    ///
    /// # Errors
    /// Returns a classified error so the retry policy can decide.
    async fn submit(&self, payload: &Payload) -> Result<SubmitReceipt, SubmitError>;
}
