//! PassthroughFormatter - default content formatter
//!
//! Builds the payload straight from the item and enforces the per-destination
//! rules from configuration (title required, maximum body length).

use std::collections::HashMap;

use contracts::{ContentFormatter, ContentItem, DestinationConfig, DestinationId, FormatError, Payload};

/// Formatting constraints of one destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatRules {
    /// Maximum body length in characters
    pub max_length: Option<usize>,
    /// A non-blank title must be present
    pub require_title: bool,
}

impl From<&DestinationConfig> for FormatRules {
    fn from(config: &DestinationConfig) -> Self {
        Self {
            max_length: config.max_length,
            require_title: config.require_title,
        }
    }
}

/// Copies title, body, source URL and tags into the payload
#[derive(Debug, Clone, Default)]
pub struct PassthroughFormatter {
    rules: HashMap<DestinationId, FormatRules>,
}

impl PassthroughFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rules for one destination
    pub fn with_rules(mut self, destination: impl Into<DestinationId>, rules: FormatRules) -> Self {
        self.rules.insert(destination.into(), rules);
        self
    }

    /// Rules taken from the destination configs
    pub fn from_configs<'a>(configs: impl IntoIterator<Item = &'a DestinationConfig>) -> Self {
        let rules = configs
            .into_iter()
            .map(|c| (DestinationId::new(&c.id), FormatRules::from(c)))
            .collect();
        Self { rules }
    }
}

impl ContentFormatter for PassthroughFormatter {
    fn format(
        &self,
        destination: &DestinationId,
        item: &ContentItem,
    ) -> Result<Payload, FormatError> {
        let rules = self.rules.get(destination).copied().unwrap_or_default();

        let title = item
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        if rules.require_title && title.is_none() {
            return Err(FormatError::missing_field("title"));
        }

        let payload = Payload {
            title,
            body: item.body.clone(),
            link: item.source_url.clone(),
            tags: item.tags.clone(),
        };

        if let Some(limit) = rules.max_length {
            let length = payload.char_len();
            if length > limit {
                return Err(FormatError::TooLong { length, limit });
            }
        }

        Ok(payload)
    }
}
