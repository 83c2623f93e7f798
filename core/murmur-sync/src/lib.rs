//! Publication sync for the Murmur client core.
//!
//! Local-first: pages are always served from the [`murmur_storage::EntityStore`]
//! and reconciled against the server in the background.
//!
//! - [`SyncEngine`]: reconciliation, paging and diff publication
//! - [`SnapshotSource`]: where server snapshots come from, with
//!   [`HttpSnapshotSource`] as the REST implementation
//! - [`ReconcileReach`]: which pages are reconciled

mod engine;
mod error;
mod reach;
mod source;

pub use engine::{PageLoad, SyncConfig, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use reach::ReconcileReach;
pub use source::{HttpSnapshotSource, SnapshotSource};
