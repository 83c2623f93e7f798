//! Sync engine: local-first reads, background reconciliation.
//!
//! The UI always reads from the [`EntityStore`]. Loading a page covered by
//! the configured [`ReconcileReach`] also starts a detached task that
//! fetches the same page from the server, writes anything newer, and
//! publishes the diff to subscribers when something changed.

use crate::error::{SyncError, SyncResult};
use crate::reach::ReconcileReach;
use crate::source::SnapshotSource;
use murmur_model::{Entity, Page, SyncDiffResult};
use murmur_storage::{EntityStore, StorageError, UpsertOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Publications per page, locally and on the wire.
    pub page_size: usize,
    /// Pages reconciled in the background.
    pub reach: ReconcileReach,
    /// Upper bound on pages visited by a refresh with unbounded reach.
    pub max_pages: usize,
    /// Capacity of the diff broadcast channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            reach: ReconcileReach::FirstPage,
            max_pages: 50,
            event_capacity: 16,
        }
    }
}

/// A page read from local state, plus the reconciliation it started.
#[derive(Debug)]
pub struct PageLoad {
    pub page: Page<Entity>,
    /// Background reconciliation of this page, if the reach covers it.
    pub sync: Option<JoinHandle<SyncResult<SyncDiffResult>>>,
}

/// Reconciles server snapshots into the local store. Clones share the
/// store, source and subscriber list.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<EntityStore>,
    source: Arc<dyn SnapshotSource>,
    config: SyncConfig,
    events: broadcast::Sender<SyncDiffResult>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(store: Arc<EntityStore>, source: Arc<dyn SnapshotSource>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            store,
            source,
            config,
            events,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Subscribes to diffs that changed local state.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncDiffResult> {
        self.events.subscribe()
    }

    // ── Reconciliation ───────────────────────────────────────────

    /// Classifies each server entity against local state and writes the
    /// new and newer ones.
    ///
    /// A server copy only wins when its `updated_at` is strictly greater
    /// than the local one; the comparison and the write are one store
    /// operation, so overlapping cycles cannot regress a row. Items that
    /// fail are logged and left out of the result. A closed store aborts
    /// the whole cycle.
    pub fn reconcile(&self, snapshot: Vec<Entity>) -> SyncResult<SyncDiffResult> {
        let mut diff = SyncDiffResult::default();

        for server in snapshot {
            match self.store.upsert_if_newer(&server) {
                Ok(UpsertOutcome::Inserted) => diff.new_entities.push(server),
                Ok(UpsertOutcome::Updated) => diff.updated_entities.push(server),
                Ok(UpsertOutcome::Unchanged(local)) => diff.unchanged_entities.push(local),
                Err(StorageError::Closed) => return Err(StorageError::Closed.into()),
                Err(e) => warn!("Skipping {}: {}", server.id, e),
            }
        }

        debug!(
            "Reconciled: {} new, {} updated, {} unchanged",
            diff.new_entities.len(),
            diff.updated_entities.len(),
            diff.unchanged_entities.len()
        );
        Ok(diff)
    }

    /// Fetches one page, reconciles it and publishes the diff if anything
    /// changed.
    pub async fn sync_now(&self, page: usize) -> SyncResult<SyncDiffResult> {
        let snapshot = self.source.fetch_page(page, self.config.page_size).await?;
        let diff = self.reconcile_blocking(snapshot.entities).await?;
        self.publish(&diff);
        Ok(diff)
    }

    /// Reconciles every page the configured reach covers, stopping early at
    /// the first short page. Publishes one combined diff.
    pub async fn refresh(&self) -> SyncResult<SyncDiffResult> {
        let last = self
            .config
            .reach
            .last_page()
            .unwrap_or(usize::MAX)
            .min(self.config.max_pages.saturating_sub(1));
        let mut combined = SyncDiffResult::default();

        for page in 0..=last {
            let snapshot = self.source.fetch_page(page, self.config.page_size).await?;
            let seen = snapshot.entities.len() + snapshot.rejected.len();
            combined.merge(self.reconcile_blocking(snapshot.entities).await?);
            if seen < self.config.page_size {
                break;
            }
        }

        self.publish(&combined);
        Ok(combined)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns page `page` from local state immediately. If the reach
    /// covers the page and a runtime is available, reconciliation of the
    /// same page starts in the background.
    pub fn load_page(&self, page: usize) -> SyncResult<PageLoad> {
        let local = self.store.get_all_paged(page, self.config.page_size)?;

        let sync = if self.config.reach.covers(page) {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let engine = self.clone();
                    Some(runtime.spawn(async move { engine.background_sync(page).await }))
                }
                Err(_) => {
                    debug!("No async runtime, skipping background sync of page {}", page);
                    None
                }
            }
        } else {
            None
        };

        Ok(PageLoad { page: local, sync })
    }

    async fn background_sync(&self, page: usize) -> SyncResult<SyncDiffResult> {
        let result = self.sync_now(page).await;
        match &result {
            Ok(_) => {}
            Err(e) if e.is_closed() => debug!("Session ended, dropped sync of page {}", page),
            Err(e) => warn!("Background sync of page {} failed: {}", page, e),
        }
        result
    }

    async fn reconcile_blocking(&self, entities: Vec<Entity>) -> SyncResult<SyncDiffResult> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.reconcile(entities))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }

    fn publish(&self, diff: &SyncDiffResult) {
        if !diff.has_changes() {
            return;
        }
        info!(
            "Sync wrote {} new and {} updated publications",
            diff.new_entities.len(),
            diff.updated_entities.len()
        );
        let _ = self.events.send(diff.clone());
    }
}
