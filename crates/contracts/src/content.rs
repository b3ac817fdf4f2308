//! Content items, fingerprints and formatted payloads
//!
//! A `ContentItem` is the caller-owned input of a dispatch call. The
//! fingerprint derived from it is the idempotency key used by duplicate
//! detection, so normalization must be stable across releases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::DestinationId;

/// Query parameters that never change what a link points at.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref", "ref_src", "mc_cid", "mc_eid"];

/// Field separator fed to the hasher between components.
const SEPARATOR: [u8; 1] = [0x1f];

/// One logical piece of content to publish.
///
/// Immutable once handed to the dispatcher; destination tasks share it
/// read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Caller-chosen stable identifier
    pub id: String,

    /// Main text
    pub body: String,

    /// Link to the original source, if the content is derived from one
    #[serde(default)]
    pub source_url: Option<String>,

    /// Optional headline (required by some destinations)
    #[serde(default)]
    pub title: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    /// Create an item with only an id and a body
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            source_url: None,
            title: None,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the source URL
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Deterministic idempotency key (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Fingerprint of the content itself: normalized `(source_url, body)`.
    pub fn of_content(item: &ContentItem) -> Self {
        let url = item.source_url.as_deref().map(normalize_url).unwrap_or_default();
        Self::digest(&[
            b"content".as_slice(),
            url.as_bytes(),
            normalize_text(&item.body).as_bytes(),
        ])
    }

    /// Fingerprint used for duplicate detection on one destination.
    ///
    /// Keyed on `(destination, source_url)`; items without a source URL fall
    /// back to `(destination, body)`.
    pub fn for_destination(destination: &DestinationId, item: &ContentItem) -> Self {
        match item.source_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Self::digest(&[
                b"url".as_slice(),
                destination.as_bytes(),
                normalize_url(url).as_bytes(),
            ]),
            _ => Self::digest(&[
                b"body".as_slice(),
                destination.as_bytes(),
                normalize_text(&item.body).as_bytes(),
            ]),
        }
    }

    /// Wrap an already computed fingerprint (e.g. read back from storage)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digest(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
            hasher.update(SEPARATOR);
        }
        Self(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase and collapse all whitespace runs into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form of a source URL.
///
/// Drops the fragment, tracking query parameters (`utm_*` and friends) and
/// trailing slashes; scheme and host are lowercased by the parser. Strings
/// that do not parse as URLs fall back to text normalization.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return normalize_text(trimmed);
    };

    url.set_fragment(None);
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept.iter());
    }

    url.as_str().trim_end_matches('/').to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Destination-ready payload produced by a `ContentFormatter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Optional headline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Text to publish
    pub body: String,

    /// Link attached to the post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Payload {
    /// Payload with only a body
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            title: None,
            body: body.into(),
            link: None,
            tags: Vec::new(),
        }
    }

    /// Length of the body in characters
    pub fn char_len(&self) -> usize {
        self.body.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_whitespace_and_case() {
        let dest: DestinationId = "devto".into();
        let a = ContentItem::new("a", "Rust 2.0  released\n today");
        let b = ContentItem::new("b", "  rust 2.0 Released today ");
        assert_eq!(
            ContentFingerprint::for_destination(&dest, &a),
            ContentFingerprint::for_destination(&dest, &b)
        );
    }

    #[test]
    fn test_fingerprint_prefers_source_url() {
        let dest: DestinationId = "mastodon".into();
        let a = ContentItem::new("a", "first take").with_source_url("https://Example.com/post/1/");
        let b = ContentItem::new("b", "completely different text")
            .with_source_url("https://example.com/post/1?utm_source=feed#comments");
        assert_eq!(
            ContentFingerprint::for_destination(&dest, &a),
            ContentFingerprint::for_destination(&dest, &b)
        );
    }

    #[test]
    fn test_fingerprint_differs_per_destination() {
        let item = ContentItem::new("a", "hello").with_source_url("https://example.com/x");
        let x = ContentFingerprint::for_destination(&"x".into(), &item);
        let y = ContentFingerprint::for_destination(&"y".into(), &item);
        assert_ne!(x, y);
    }

    #[test]
    fn test_content_fingerprint_uses_body_and_url() {
        let a = ContentItem::new("a", "hello").with_source_url("https://example.com/x");
        let b = ContentItem::new("b", "hello").with_source_url("https://example.com/y");
        assert_ne!(
            ContentFingerprint::of_content(&a),
            ContentFingerprint::of_content(&b)
        );
        assert_eq!(ContentFingerprint::of_content(&a).as_str().len(), 64);
    }

    #[test]
    fn test_normalize_url_keeps_meaningful_query() {
        assert_eq!(
            normalize_url("https://example.com/search?q=rust&utm_medium=x"),
            "https://example.com/search?q=rust"
        );
        assert_eq!(normalize_url("not a url"), "not a url");
    }

    #[test]
    fn test_normalize_url_trailing_slash_before_query() {
        assert_eq!(
            normalize_url("https://x.com/a/?id=1"),
            normalize_url("https://x.com/a?id=1")
        );
        assert_eq!(normalize_url("https://x.com/a/?id=1"), "https://x.com/a?id=1");
        assert_eq!(normalize_url("https://x.com/"), "https://x.com");
    }

    #[test]
    fn test_payload_char_len_counts_chars() {
        let payload = Payload::text("héllo");
        assert_eq!(payload.char_len(), 5);
    }
}
