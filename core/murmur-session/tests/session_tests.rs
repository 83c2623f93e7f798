use async_trait::async_trait;
use murmur_media::{CacheCategory, CacheTierConfig, DeviceClass, PlatformClass};
use murmur_model::{Entity, NormalizedSnapshot};
use murmur_net::{FetchedMedia, MediaFetcher, NetResult};
use murmur_session::{SessionConfig, SessionContext, SessionError, SessionManager, SessionOptions};
use murmur_storage::{Namespace, StorageError};
use murmur_sync::{SnapshotSource, SyncResult};
use murmur_types::{Timestamp, UserId};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

// ── Fixtures ─────────────────────────────────────────────────────

struct PngFetcher;

#[async_trait]
impl MediaFetcher for PngFetcher {
    async fn fetch_bytes(&self, _url: &str, _timeout: Duration) -> NetResult<FetchedMedia> {
        Ok(FetchedMedia::new(PNG, "image/png"))
    }
}

/// Serves a fixed first page. When gated, each fetch waits for a permit.
#[derive(Default)]
struct FirstPageSource {
    entities: Vec<Entity>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl SnapshotSource for FirstPageSource {
    async fn fetch_page(&self, page: usize, _page_size: usize) -> SyncResult<NormalizedSnapshot> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let entities = if page == 0 { self.entities.clone() } else { Vec::new() };
        Ok(NormalizedSnapshot {
            entities,
            rejected: Vec::new(),
        })
    }
}

fn publication(id: &str, at: i64) -> Entity {
    Entity::new(id, json!({ "title": id }), Timestamp::from_millis(at))
}

fn options(source: FirstPageSource) -> SessionOptions {
    SessionOptions::new(Arc::new(PngFetcher), Arc::new(source))
}

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

async fn wait_for_user(manager: &SessionManager, expected: Option<&UserId>) {
    for _ in 0..200 {
        if let Some(ctx) = manager.current() {
            if ctx.user() == expected {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never switched to {expected:?}");
}

// ── Opening ──────────────────────────────────────────────────────

#[tokio::test]
async fn open_binds_everything_to_the_user_namespace() {
    let alice = user("alice");
    let ctx = SessionContext::open(Some(alice.clone()), &options(FirstPageSource::default())).unwrap();

    assert_eq!(ctx.user(), Some(&alice));
    assert_eq!(ctx.namespace(), &Namespace::for_user(&alice));
    assert_eq!(ctx.store().namespace(), ctx.namespace());
    assert!(ctx.media().has_persistent_tier());
    assert!(ctx.has_purge_task());
    assert_eq!(ctx.handles().ceiling(), 20);
    assert!(!ctx.is_closed());
}

#[tokio::test]
async fn no_user_opens_the_anonymous_session() {
    let ctx = SessionContext::open(None, &options(FirstPageSource::default())).unwrap();
    assert_eq!(ctx.user(), None);
    assert_eq!(ctx.namespace(), &Namespace::anonymous());
}

#[test]
fn open_outside_a_runtime_skips_the_purge_task() {
    let ctx = SessionContext::open(None, &options(FirstPageSource::default())).unwrap();
    assert!(!ctx.has_purge_task());
    ctx.close();
}

#[tokio::test]
async fn constrained_platform_has_no_persistent_tier() {
    let config = SessionConfig {
        platform: PlatformClass::Constrained,
        ..SessionConfig::default()
    };
    let opts = options(FirstPageSource::default()).with_config(config);
    let ctx = SessionContext::open(None, &opts).unwrap();
    assert!(!ctx.media().has_persistent_tier());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = SessionConfig::default();
    config.sync.page_size = 0;
    let opts = options(FirstPageSource::default()).with_config(config);

    let err = SessionContext::open(None, &opts).unwrap_err();
    assert!(matches!(err, SessionError::InvalidConfig(_)));
}

// ── Closing ──────────────────────────────────────────────────────

#[tokio::test]
async fn close_releases_handles_and_closes_the_store() {
    let ctx = SessionContext::open(None, &options(FirstPageSource::default())).unwrap();
    let resolved = ctx
        .media()
        .resolve("https://cdn.example/a.png", CacheCategory::Profile)
        .await
        .unwrap();
    assert!(resolved.handle().is_some());
    assert_eq!(ctx.handles().live_count(), 1);

    ctx.close();
    ctx.close();

    assert!(ctx.is_closed());
    assert!(!ctx.has_purge_task());
    assert_eq!(ctx.handles().live_count(), 0);
    assert!(matches!(
        ctx.store().get(&"a".into()),
        Err(StorageError::Closed)
    ));
}

// ── Switching users ──────────────────────────────────────────────

#[tokio::test]
async fn users_sharing_a_database_never_see_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        database_path: Some(dir.path().join("murmur.db")),
        ..SessionConfig::default()
    };
    let source = FirstPageSource {
        entities: vec![publication("p1", 1_000), publication("p2", 2_000)],
        ..FirstPageSource::default()
    };
    let manager = SessionManager::new(options(source).with_config(config));

    let alice = manager.switch_user(Some(user("alice"))).unwrap();
    let diff = alice.sync().sync_now(0).await.unwrap();
    assert_eq!(diff.new_entities.len(), 2);

    let bob = manager.switch_user(Some(user("bob"))).unwrap();
    assert!(alice.is_closed());
    assert_eq!(bob.store().count().unwrap(), 0);

    let alice_again = manager.switch_user(Some(user("alice"))).unwrap();
    assert!(bob.is_closed());
    let page = alice_again.store().get_all_paged(0, 10).unwrap();
    let ids: Vec<_> = page.items.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["p2", "p1"]);
}

#[tokio::test]
async fn switching_to_the_active_user_keeps_the_session() {
    let manager = SessionManager::new(options(FirstPageSource::default()));
    let first = manager.switch_user(Some(user("alice"))).unwrap();
    let second = manager.switch_user(Some(user("alice"))).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!first.is_closed());
}

#[tokio::test]
async fn stale_sync_fails_quietly_after_switch() {
    let gate = Arc::new(Notify::new());
    let source = FirstPageSource {
        entities: vec![publication("p1", 1_000)],
        gate: Some(gate.clone()),
        ..FirstPageSource::default()
    };
    let manager = SessionManager::new(options(source));

    let alice = manager.switch_user(Some(user("alice"))).unwrap();
    let load = alice.sync().load_page(0).unwrap();
    assert!(load.page.items.is_empty());
    let pending = load.sync.unwrap();

    let bob = manager.switch_user(Some(user("bob"))).unwrap();
    gate.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_closed());
    assert_eq!(bob.store().count().unwrap(), 0);
}

#[tokio::test]
async fn end_session_closes_the_active_context() {
    let manager = SessionManager::new(options(FirstPageSource::default()));
    assert!(!manager.end_session());

    let ctx = manager.switch_user(None).unwrap();
    assert!(manager.end_session());
    assert!(ctx.is_closed());
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn follow_tracks_the_session_signal() {
    let manager = Arc::new(SessionManager::new(options(FirstPageSource::default())));
    let (tx, rx) = watch::channel(None);
    let follower = manager.follow(rx);

    wait_for_user(&manager, None).await;
    let anonymous = manager.current().unwrap();

    let alice = user("alice");
    tx.send(Some(alice.clone())).unwrap();
    wait_for_user(&manager, Some(&alice)).await;
    assert!(anonymous.is_closed());

    tx.send(None).unwrap();
    wait_for_user(&manager, None).await;

    drop(tx);
    follower.await.unwrap();
    assert!(manager.current().is_some());
}

#[tokio::test]
async fn switch_user_async_runs_off_the_runtime_threads() {
    let manager = Arc::new(SessionManager::new(options(FirstPageSource::default())));
    let ctx = manager.switch_user_async(Some(user("carol"))).await.unwrap();
    assert_eq!(ctx.user(), Some(&user("carol")));
}

// ── Configuration ────────────────────────────────────────────────

#[test]
fn partial_config_fills_in_defaults() {
    let config: SessionConfig =
        serde_json::from_value(json!({ "device": "high", "platform": "mobile" })).unwrap();

    assert_eq!(config.cache(), CacheTierConfig::select(DeviceClass::High, PlatformClass::Mobile));
    assert_eq!(config.handle_ceiling, 20);
    assert_eq!(config.purge_interval(), Duration::from_secs(300));
    assert_eq!(config.database_path, None);
}

#[test]
fn cache_override_wins_over_device_selection() {
    let custom = CacheTierConfig {
        max_entry_count: 3,
        ..CacheTierConfig::default()
    };
    let config = SessionConfig {
        device: DeviceClass::Low,
        cache_override: Some(custom),
        ..SessionConfig::default()
    };
    assert_eq!(config.cache(), custom);
}
