//! Core type definitions for the Murmur client core.
//!
//! This crate defines the small, dependency-light types shared by every
//! other crate in the workspace:
//! - Identifiers for entities, users and renderer handles
//! - Millisecond timestamps and an injectable [`Clock`]
//!
//! Domain types (publications, cached blobs, sync results) live in their
//! owning crates, not here.

mod clock;
mod ids;
mod timestamp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{EntityId, HandleRef, UserId};
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
