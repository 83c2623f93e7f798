//! Publication model for the Murmur client core.
//!
//! Defines the types that flow between storage, sync and the UI:
//! - [`Entity`]: the local projection of a server publication
//! - [`Page`]: one locally sliced page of entities
//! - [`SyncDiffResult`]: the outcome of one reconciliation cycle
//! - [`dto`]: the boundary adapter that turns any server response shape
//!   into entities, so nothing past it branches on wire format

pub mod dto;
mod diff;
mod entity;
mod page;

pub use diff::SyncDiffResult;
pub use dto::{normalize_snapshot, DtoError, NormalizedSnapshot, PublicationDto};
pub use entity::Entity;
pub use page::Page;
