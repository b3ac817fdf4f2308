//! # Contracts
//!
//! Frozen interface contracts shared by the dispatcher crates: identifiers,
//! content and fingerprints, attempt records, collaborator traits and the
//! configuration blueprint. Business crates depend on this crate only;
//! reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall-clock timestamps are `chrono::DateTime<Utc>`
//! - Durations (limits, backoff, lookback) are `std::time::Duration`

mod attempt;
mod blueprint;
mod client;
mod content;
mod destination_id;
mod error;
mod formatter;
mod history;
mod policy;

pub use attempt::*;
pub use blueprint::*;
pub use client::*;
pub use content::*;
pub use destination_id::DestinationId;
pub use error::*;
pub use formatter::*;
pub use history::History;
pub use policy::*;
