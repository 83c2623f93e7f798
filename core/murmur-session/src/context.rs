//! One signed-in (or anonymous) user's view of the client core.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use murmur_media::{BypassPolicy, MediaCache, ObjectHandleTracker, SqlitePersistentTier};
use murmur_net::{ConnectionProfile, HttpClient, MediaFetcher};
use murmur_storage::{
    open_sqlite, open_sqlite_in_memory, BlobStore, EntityStore, Namespace, SharedConnection,
};
use murmur_sync::{HttpSnapshotSource, SnapshotSource, SyncEngine};
use murmur_types::{Clock, SystemClock, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Collaborators shared by every session a manager opens.
#[derive(Clone)]
pub struct SessionOptions {
    pub config: SessionConfig,
    pub media_fetcher: Arc<dyn MediaFetcher>,
    pub snapshot_source: Arc<dyn SnapshotSource>,
    pub profile: ConnectionProfile,
    pub bypass: BypassPolicy,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("config", &self.config)
            .field("bypass", &self.bypass)
            .finish_non_exhaustive()
    }
}

impl SessionOptions {
    /// Options with the default config, a fresh connection profile, no
    /// bypass domains and the system clock.
    pub fn new(media_fetcher: Arc<dyn MediaFetcher>, snapshot_source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            config: SessionConfig::default(),
            media_fetcher,
            snapshot_source,
            profile: ConnectionProfile::default(),
            bypass: BypassPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Options that fetch media and publication pages through one HTTP
    /// client.
    pub fn http(client: HttpClient, api_base_url: impl Into<String>) -> Self {
        let client = Arc::new(client);
        let source = HttpSnapshotSource::new(client.clone(), api_base_url);
        Self::new(client, Arc::new(source))
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_profile(mut self, profile: ConnectionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_bypass(mut self, bypass: BypassPolicy) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Everything bound to one user's namespace: the entity store, the media
/// cache with its handle tracker, and the sync engine.
///
/// Closing a context releases its handles, stops the purge task and
/// closes the entity store, so sync work still in flight for this user
/// fails with `Closed` instead of writing into the next session.
pub struct SessionContext {
    user: Option<UserId>,
    namespace: Namespace,
    store: Arc<EntityStore>,
    media: MediaCache,
    handles: ObjectHandleTracker,
    sync: SyncEngine,
    purge_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("namespace", &self.namespace)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Opens a session for `user`, or the anonymous session for `None`.
    ///
    /// The purge task is only started when called inside a Tokio runtime.
    pub fn open(user: Option<UserId>, options: &SessionOptions) -> SessionResult<Self> {
        let config = &options.config;
        config.validate().map_err(SessionError::InvalidConfig)?;

        let namespace = match &user {
            Some(user) => Namespace::for_user(user),
            None => Namespace::anonymous(),
        };
        let conn = connect(config)?;

        let store = Arc::new(EntityStore::open_with_conn(
            conn.clone(),
            namespace.clone(),
            config.entity_store,
        )?);

        let cache_config = config.cache();
        let handles = ObjectHandleTracker::with_clock(config.handle_ceiling, options.clock.clone());
        let mut builder = MediaCache::builder(
            cache_config,
            options.media_fetcher.clone(),
            options.profile.clone(),
        )
        .bypass(options.bypass.clone())
        .handles(handles.clone())
        .clock(options.clock.clone());
        if cache_config.persistent_tier {
            let blobs = Arc::new(BlobStore::open_with_conn(conn)?);
            builder = builder.persistent(Arc::new(SqlitePersistentTier::new(blobs, namespace.clone())));
        }
        let media = builder.build();

        let purge_task = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(media.spawn_purge_task(config.purge_interval())),
            Err(_) => {
                debug!("No async runtime, cache purging left to the caller");
                None
            }
        };

        let sync = SyncEngine::new(store.clone(), options.snapshot_source.clone(), config.sync.clone());

        info!("Opened session for namespace {}", namespace);
        Ok(Self {
            user,
            namespace,
            store,
            media,
            handles,
            sync,
            purge_task: Mutex::new(purge_task),
            closed: AtomicBool::new(false),
        })
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn media(&self) -> &MediaCache {
        &self.media
    }

    pub fn handles(&self) -> &ObjectHandleTracker {
        &self.handles
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn has_purge_task(&self) -> bool {
        self.purge_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ends the session. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let released = self.handles.release_all();
        if let Some(task) = self
            .purge_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
        self.store.close();
        info!(
            "Closed session for namespace {}, released {} handles",
            self.namespace, released
        );
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect(config: &SessionConfig) -> SessionResult<SharedConnection> {
    let conn = match &config.database_path {
        Some(path) => open_sqlite(path)?,
        None => open_sqlite_in_memory()?,
    };
    Ok(conn)
}
