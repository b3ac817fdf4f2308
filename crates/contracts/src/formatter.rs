//! ContentFormatter trait - content enhancer seam
//!
//! Turns a `ContentItem` into the payload a given destination expects. The
//! dispatcher treats it as opaque; a formatting failure is never retried.

use thiserror::Error;

use crate::{ContentItem, DestinationId, Payload, SubmitErrorKind};

/// Content cannot be formatted for a destination
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A field the destination requires is absent
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    /// Formatted body exceeds the destination limit
    #[error("content too long: {length} chars exceeds limit of {limit}")]
    TooLong { length: usize, limit: usize },

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl FormatError {
    /// Create a missing-field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Submission error kind this maps onto
    pub fn kind(&self) -> SubmitErrorKind {
        match self {
            FormatError::TooLong { .. } => SubmitErrorKind::ContentTooLong,
            FormatError::MissingField { .. } | FormatError::Other(_) => {
                SubmitErrorKind::Validation
            }
        }
    }
}

/// Per-destination formatting function
pub trait ContentFormatter: Send + Sync {
    /// Build the payload for `destination`
    ///
    /// # Errors
    /// Returns a format error when the item cannot be published there.
    fn format(&self, destination: &DestinationId, item: &ContentItem)
        -> Result<Payload, FormatError>;
}

impl<F> ContentFormatter for F
where
    F: Fn(&DestinationId, &ContentItem) -> Result<Payload, FormatError> + Send + Sync,
{
    fn format(
        &self,
        destination: &DestinationId,
        item: &ContentItem,
    ) -> Result<Payload, FormatError> {
        self(destination, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_formatter() {
        let formatter = |_: &DestinationId, item: &ContentItem| {
            Ok::<_, FormatError>(Payload::text(item.body.clone()))
        };
        let payload = formatter
            .format(&"x".into(), &ContentItem::new("1", "hi"))
            .unwrap();
        assert_eq!(payload.body, "hi");
    }

    #[test]
    fn test_format_error_kind() {
        assert_eq!(
            FormatError::TooLong {
                length: 600,
                limit: 500
            }
            .kind(),
            SubmitErrorKind::ContentTooLong
        );
        assert_eq!(
            FormatError::missing_field("title").kind(),
            SubmitErrorKind::Validation
        );
    }
}
