//! Destination client implementations
//!
//! Contains LogDestination, FileDestination, and WebhookDestination.

mod file;
mod log;
mod webhook;

pub use self::file::{FileDestination, FileDestinationConfig};
pub use self::log::LogDestination;
pub use self::webhook::{classify_status, WebhookDestination, WebhookDestinationConfig};
