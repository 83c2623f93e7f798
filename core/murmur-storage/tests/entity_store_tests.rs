use murmur_model::Entity;
use murmur_storage::{
    open_sqlite, open_sqlite_in_memory, EntityStore, EntityStoreConfig, Namespace, StorageError,
    UpsertOutcome,
};
use murmur_types::{EntityId, Timestamp, UserId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;

fn store() -> EntityStore {
    EntityStore::open_in_memory(Namespace::anonymous(), EntityStoreConfig::default()).unwrap()
}

fn entity(id: &str, created: i64) -> Entity {
    Entity::new(id, json!({ "id": id, "title": format!("post {id}") }), Timestamp::from_millis(created))
}

fn ids(entities: &[Entity]) -> Vec<&str> {
    entities.iter().map(|e| e.id.as_str()).collect()
}

// ── Namespaces ───────────────────────────────────────────────────

#[test]
fn namespace_is_stable_and_opaque() {
    let alice = UserId::parse("alice").unwrap();
    let ns = Namespace::for_user(&alice);
    assert_eq!(ns, Namespace::for_user(&alice));
    assert!(ns.as_str().starts_with("u_"));
    assert_eq!(ns.as_str().len(), 18);
    assert!(!ns.as_str().contains("alice"));
}

#[test]
fn different_users_get_different_namespaces() {
    let a = Namespace::for_user(&UserId::parse("alice").unwrap());
    let b = Namespace::for_user(&UserId::parse("bob").unwrap());
    assert_ne!(a, b);
    assert_ne!(a, Namespace::anonymous());
}

#[test]
fn stores_sharing_a_connection_are_isolated() {
    let conn = open_sqlite_in_memory().unwrap();
    let alice = Namespace::for_user(&UserId::parse("alice").unwrap());
    let bob = Namespace::for_user(&UserId::parse("bob").unwrap());
    let a = EntityStore::open_with_conn(conn.clone(), alice, EntityStoreConfig::default()).unwrap();
    let b = EntityStore::open_with_conn(conn, bob, EntityStoreConfig::default()).unwrap();

    a.upsert(&entity("p1", 10)).unwrap();
    b.upsert(&entity("p2", 20)).unwrap();

    assert!(a.get(&EntityId::new("p2")).unwrap().is_none());
    assert!(b.get(&EntityId::new("p1")).unwrap().is_none());
    assert_eq!(a.count().unwrap(), 1);
    assert_eq!(b.count().unwrap(), 1);

    a.clear().unwrap();
    assert_eq!(a.count().unwrap(), 0);
    assert_eq!(b.count().unwrap(), 1);
}

// ── Get / upsert ─────────────────────────────────────────────────

#[test]
fn get_missing_returns_none() {
    assert!(store().get(&EntityId::new("nope")).unwrap().is_none());
}

#[test]
fn upsert_then_get_roundtrips_payload() {
    let s = store();
    let e = entity("p1", 100).updated(Timestamp::from_millis(150));
    s.upsert(&e).unwrap();
    assert_eq!(s.get(&e.id).unwrap(), Some(e));
}

#[test]
fn upsert_is_idempotent() {
    let s = store();
    let e = entity("p1", 100);
    s.upsert(&e).unwrap();
    s.upsert(&e).unwrap();
    assert_eq!(s.count().unwrap(), 1);
    assert_eq!(s.get(&e.id).unwrap(), Some(e));
}

#[test]
fn upsert_replaces_existing() {
    let s = store();
    s.upsert(&entity("p1", 100)).unwrap();
    let newer = Entity::new("p1", json!({ "id": "p1", "title": "edited" }), Timestamp::from_millis(100))
        .updated(Timestamp::from_millis(500));
    s.upsert(&newer).unwrap();

    let stored = s.get(&EntityId::new("p1")).unwrap().unwrap();
    assert_eq!(stored.get_str("/title"), Some("edited"));
    assert_eq!(stored.updated_at, Timestamp::from_millis(500));
}

#[test]
fn empty_id_is_rejected() {
    let s = store();
    let err = s.upsert(&entity("  ", 1)).unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
    assert_eq!(s.count().unwrap(), 0);
}

#[test]
fn upsert_many_keeps_going_after_a_bad_item() {
    let s = store();
    let batch = vec![entity("a", 1), entity("", 2), entity("c", 3)];
    let err = s.upsert_many(&batch).unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
    assert_eq!(s.count().unwrap(), 2);
    assert!(s.get(&EntityId::new("c")).unwrap().is_some());
}

#[test]
fn upsert_many_returns_written_count() {
    let s = store();
    let written = s.upsert_many(&[entity("a", 1), entity("b", 2)]).unwrap();
    assert_eq!(written, 2);
}

#[test]
fn delete_reports_existence() {
    let s = store();
    s.upsert(&entity("p1", 1)).unwrap();
    assert!(s.delete(&EntityId::new("p1")).unwrap());
    assert!(!s.delete(&EntityId::new("p1")).unwrap());
}

// ── Conditional upsert ───────────────────────────────────────────

#[test]
fn upsert_if_newer_classifies_writes() {
    let s = store();
    let v1 = entity("p1", 1).updated(Timestamp::from_millis(10));
    assert_eq!(s.upsert_if_newer(&v1).unwrap(), UpsertOutcome::Inserted);

    let same = v1.clone();
    assert_eq!(s.upsert_if_newer(&same).unwrap(), UpsertOutcome::Unchanged(v1.clone()));

    let v2 = entity("p1", 1).updated(Timestamp::from_millis(20));
    assert_eq!(s.upsert_if_newer(&v2).unwrap(), UpsertOutcome::Updated);

    let stale = entity("p1", 1).updated(Timestamp::from_millis(15));
    assert_eq!(s.upsert_if_newer(&stale).unwrap(), UpsertOutcome::Unchanged(v2.clone()));
    assert_eq!(s.get(&EntityId::new("p1")).unwrap(), Some(v2));
}

#[test]
fn upsert_if_newer_rejects_empty_id() {
    let err = store().upsert_if_newer(&entity("", 1)).unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
}

#[test]
fn concurrent_writers_never_regress_updated_at() {
    let s = Arc::new(store());
    let ids: Vec<String> = (0..200).map(|i| format!("p{i}")).collect();

    for _ in 0..10 {
        s.clear().unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let writers: Vec<_> = [10i64, 20]
            .into_iter()
            .map(|version| {
                let (s, barrier, ids) = (s.clone(), barrier.clone(), ids.clone());
                thread::spawn(move || {
                    barrier.wait();
                    for id in &ids {
                        let e = entity(id, 1).updated(Timestamp::from_millis(version));
                        s.upsert_if_newer(&e).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        for id in &ids {
            let stored = s.get(&EntityId::new(id.as_str())).unwrap().unwrap();
            assert_eq!(stored.updated_at, Timestamp::from_millis(20), "{id} regressed");
        }
    }
}

// ── Paging ───────────────────────────────────────────────────────

#[test]
fn pages_are_newest_first() {
    let s = store();
    for (id, t) in [("a", 10), ("b", 30), ("c", 20), ("d", 40), ("e", 50)] {
        s.upsert(&entity(id, t)).unwrap();
    }

    let first = s.get_all_paged(0, 2).unwrap();
    assert_eq!(ids(&first.items), vec!["e", "d"]);
    assert_eq!(first.total, 5);
    assert!(first.has_more());

    let last = s.get_all_paged(2, 2).unwrap();
    assert_eq!(ids(&last.items), vec!["a"]);
    assert!(!last.has_more());
}

#[test]
fn ties_break_by_id() {
    let s = store();
    s.upsert(&entity("b", 10)).unwrap();
    s.upsert(&entity("a", 10)).unwrap();
    let page = s.get_all_paged(0, 10).unwrap();
    assert_eq!(ids(&page.items), vec!["a", "b"]);
}

#[test]
fn page_past_the_end_is_empty() {
    let s = store();
    s.upsert(&entity("a", 1)).unwrap();
    let page = s.get_all_paged(5, 10).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 1);
}

// ── Cap ──────────────────────────────────────────────────────────

#[test]
fn oldest_entities_are_pruned_past_the_cap() {
    let s = EntityStore::open_in_memory(Namespace::anonymous(), EntityStoreConfig { max_entities: 3 })
        .unwrap();
    for (id, t) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        s.upsert(&entity(id, t)).unwrap();
    }
    assert_eq!(s.count().unwrap(), 3);
    assert!(s.get(&EntityId::new("a")).unwrap().is_none());

    s.upsert_many(&[entity("e", 5), entity("f", 6)]).unwrap();
    let page = s.get_all_paged(0, 10).unwrap();
    assert_eq!(ids(&page.items), vec!["f", "e", "d"]);
}

// ── Close ────────────────────────────────────────────────────────

#[test]
fn closed_store_rejects_everything() {
    let s = store();
    s.upsert(&entity("a", 1)).unwrap();
    s.close();
    s.close();
    assert!(s.is_closed());

    assert!(matches!(s.get(&EntityId::new("a")), Err(StorageError::Closed)));
    assert!(matches!(s.upsert(&entity("b", 2)), Err(StorageError::Closed)));
    assert!(matches!(s.get_all_paged(0, 10), Err(StorageError::Closed)));
    assert!(matches!(s.count(), Err(StorageError::Closed)));
}

#[test]
fn error_display() {
    assert_eq!(StorageError::Closed.to_string(), "store is closed");
    let err = StorageError::QuotaExceeded { needed: 10, limit: 5 };
    assert!(err.to_string().contains("10"));
    assert!(err.is_quota());
    assert!(!StorageError::Closed.is_quota());
}

// ── Persistence ──────────────────────────────────────────────────

#[test]
fn entities_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("murmur.db");
    let ns = Namespace::for_user(&UserId::parse("alice").unwrap());

    {
        let s = EntityStore::open(&path, ns.clone(), EntityStoreConfig::default()).unwrap();
        s.upsert(&entity("p1", 42)).unwrap();
    }

    let s = EntityStore::open_with_conn(open_sqlite(&path).unwrap(), ns, EntityStoreConfig::default())
        .unwrap();
    let e = s.get(&EntityId::new("p1")).unwrap().unwrap();
    assert_eq!(e.created_at, Timestamp::from_millis(42));
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn count_never_exceeds_cap(times in prop::collection::vec(0i64..1_000, 0..40), cap in 1usize..10) {
        let s = EntityStore::open_in_memory(Namespace::anonymous(), EntityStoreConfig { max_entities: cap })
            .unwrap();
        for (i, t) in times.iter().enumerate() {
            s.upsert(&entity(&format!("id{i}"), *t)).unwrap();
        }
        prop_assert!(s.count().unwrap() <= cap);
        prop_assert_eq!(s.count().unwrap(), times.len().min(cap));
    }

    #[test]
    fn paging_visits_every_entity_once(n in 0usize..25, size in 1usize..7) {
        let s = store();
        for i in 0..n {
            s.upsert(&entity(&format!("id{i:02}"), (i as i64) % 5)).unwrap();
        }
        let mut seen = Vec::new();
        let mut page = 0;
        loop {
            let p = s.get_all_paged(page, size).unwrap();
            seen.extend(p.items.iter().map(|e| e.id.clone()));
            if !p.has_more() {
                break;
            }
            page += 1;
        }
        seen.sort();
        seen.dedup();
        prop_assert_eq!(seen.len(), n);
    }
}
