//! Per-user publication store.
//!
//! Reads never touch the network: the UI renders whatever is here and the
//! sync engine writes newer copies in behind it. The store is capped; once
//! `max_entities` is exceeded the oldest publications (by `created_at`)
//! are pruned.

use crate::error::{StorageError, StorageResult};
use crate::{lock, open_sqlite, open_sqlite_in_memory, Namespace, SharedConnection};
use murmur_model::{Entity, Page};
use murmur_types::{EntityId, Timestamp};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Entity store limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStoreConfig {
    /// Maximum publications kept per namespace.
    pub max_entities: usize,
}

impl Default for EntityStoreConfig {
    fn default() -> Self {
        Self { max_entities: 1_000 }
    }
}

/// What [`EntityStore::upsert_if_newer`] did with an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No local copy existed; the entity was written.
    Inserted,
    /// The entity replaced an older local copy.
    Updated,
    /// The local copy is at least as new and was kept.
    Unchanged(Entity),
}

/// Namespace-scoped store of publication entities.
pub struct EntityStore {
    conn: SharedConnection,
    namespace: Namespace,
    config: EntityStoreConfig,
    closed: AtomicBool,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EntityStore {
    /// Opens (or creates) a store in the database file at `path`.
    pub fn open(path: &Path, namespace: Namespace, config: EntityStoreConfig) -> StorageResult<Self> {
        Self::open_with_conn(open_sqlite(path)?, namespace, config)
    }

    /// Opens a store backed by a private in-memory database.
    pub fn open_in_memory(namespace: Namespace, config: EntityStoreConfig) -> StorageResult<Self> {
        Self::open_with_conn(open_sqlite_in_memory()?, namespace, config)
    }

    /// Opens a store on an existing connection. Several namespaces may
    /// share one connection.
    pub fn open_with_conn(
        conn: SharedConnection,
        namespace: Namespace,
        config: EntityStoreConfig,
    ) -> StorageResult<Self> {
        init_schema(&*lock(&conn)?)?;
        Ok(Self {
            conn,
            namespace,
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the namespace this store reads and writes.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the store limits.
    pub fn config(&self) -> EntityStoreConfig {
        self.config
    }

    /// Closes the store. Every later call fails with [`StorageError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed entity store for namespace {}", self.namespace);
        }
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    /// Loads one entity.
    pub fn get(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        self.ensure_open()?;
        let conn = lock(&self.conn)?;
        self.select_one(&conn, id)
    }

    /// Returns one page of entities, newest first. Pages start at 0.
    ///
    /// The full set is sorted in memory and sliced; the entity cap keeps
    /// the set small enough for that to be cheap.
    pub fn get_all_paged(&self, page: usize, page_size: usize) -> StorageResult<Page<Entity>> {
        self.ensure_open()?;
        let mut all = self.load_all()?;
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = all.len();
        let start = page.saturating_mul(page_size).min(total);
        let end = start.saturating_add(page_size).min(total);
        let items = all.drain(start..end).collect();

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Inserts or replaces one entity, then prunes past the cap.
    pub fn upsert(&self, entity: &Entity) -> StorageResult<()> {
        self.ensure_open()?;
        let conn = lock(&self.conn)?;
        self.write_one(&conn, entity)?;
        self.prune(&conn)?;
        Ok(())
    }

    /// Writes `entity` only if it is missing locally or strictly newer
    /// than the stored copy by `updated_at`.
    ///
    /// The read and the write happen under one connection lock, and the
    /// write itself is conditional, so concurrent callers can never replace
    /// a newer row with an older one.
    pub fn upsert_if_newer(&self, entity: &Entity) -> StorageResult<UpsertOutcome> {
        self.ensure_open()?;
        validate(entity)?;
        let conn = lock(&self.conn)?;

        let outcome = match self.select_one(&conn, &entity.id)? {
            Some(local) if !entity.is_newer_than(&local) => {
                return Ok(UpsertOutcome::Unchanged(local));
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        let payload = serde_json::to_string(&entity.payload)?;
        let written = conn.execute(
            "INSERT INTO entities (namespace, id, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, id) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
             WHERE excluded.updated_at > entities.updated_at",
            params![
                self.namespace.as_str(),
                entity.id.as_str(),
                payload,
                entity.created_at.as_millis(),
                entity.updated_at.as_millis(),
            ],
        )?;

        if written == 0 {
            // Another connection to the same file wrote a newer copy first.
            return match self.select_one(&conn, &entity.id)? {
                Some(local) => Ok(UpsertOutcome::Unchanged(local)),
                None => Err(StorageError::InvalidData(format!(
                    "entity {} vanished during conditional write",
                    entity.id
                ))),
            };
        }

        self.prune(&conn)?;
        Ok(outcome)
    }

    /// Writes every entity in order. Each write is durable on its own; if
    /// any fails, the rest are still attempted and the first error is
    /// returned.
    pub fn upsert_many(&self, entities: &[Entity]) -> StorageResult<usize> {
        self.ensure_open()?;
        let conn = lock(&self.conn)?;
        let mut written = 0;
        let mut first_error = None;

        for entity in entities {
            match self.write_one(&conn, entity) {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!("Failed to write entity {:?}: {}", entity.id.as_str(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.prune(&conn)?;

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Deletes one entity. Returns whether it existed.
    pub fn delete(&self, id: &EntityId) -> StorageResult<bool> {
        self.ensure_open()?;
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM entities WHERE namespace = ?1 AND id = ?2",
            params![self.namespace.as_str(), id.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Deletes every entity in this namespace.
    pub fn clear(&self) -> StorageResult<()> {
        self.ensure_open()?;
        let conn = lock(&self.conn)?;
        conn.execute(
            "DELETE FROM entities WHERE namespace = ?1",
            params![self.namespace.as_str()],
        )?;
        Ok(())
    }

    /// Number of entities in this namespace.
    pub fn count(&self) -> StorageResult<usize> {
        self.ensure_open()?;
        let conn = lock(&self.conn)?;
        count_in(&conn, &self.namespace)
    }

    fn load_all(&self) -> StorageResult<Vec<Entity>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, payload, created_at, updated_at FROM entities WHERE namespace = ?1",
        )?;
        let rows = stmt
            .query_map(params![self.namespace.as_str()], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_row).collect()
    }

    fn select_one(&self, conn: &Connection, id: &EntityId) -> StorageResult<Option<Entity>> {
        let row = conn
            .query_row(
                "SELECT id, payload, created_at, updated_at FROM entities
                 WHERE namespace = ?1 AND id = ?2",
                params![self.namespace.as_str(), id.as_str()],
                read_row,
            )
            .optional()?;
        row.map(decode_row).transpose()
    }

    fn write_one(&self, conn: &Connection, entity: &Entity) -> StorageResult<()> {
        validate(entity)?;
        let payload = serde_json::to_string(&entity.payload)?;
        conn.execute(
            "INSERT INTO entities (namespace, id, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, id) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                self.namespace.as_str(),
                entity.id.as_str(),
                payload,
                entity.created_at.as_millis(),
                entity.updated_at.as_millis(),
            ],
        )?;
        Ok(())
    }

    fn prune(&self, conn: &Connection) -> StorageResult<()> {
        let count = count_in(conn, &self.namespace)?;
        if count <= self.config.max_entities {
            return Ok(());
        }
        let excess = count - self.config.max_entities;
        conn.execute(
            "DELETE FROM entities WHERE namespace = ?1 AND id IN (
                SELECT id FROM entities WHERE namespace = ?1
                ORDER BY created_at ASC, id ASC LIMIT ?2
             )",
            params![self.namespace.as_str(), excess as i64],
        )?;
        debug!("Pruned {} oldest entities in namespace {}", excess, self.namespace);
        Ok(())
    }
}

fn validate(entity: &Entity) -> StorageResult<()> {
    if entity.id.is_empty() {
        return Err(StorageError::InvalidData("entity id must not be empty".to_string()));
    }
    Ok(())
}

fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS entities (
            namespace TEXT NOT NULL,
            id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (namespace, id)
        );

        CREATE INDEX IF NOT EXISTS idx_entities_created
            ON entities (namespace, created_at);
        ",
    )?;
    Ok(())
}

fn count_in(conn: &Connection, namespace: &Namespace) -> StorageResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entities WHERE namespace = ?1",
        params![namespace.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

type RawRow = (String, String, i64, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_row((id, payload, created_at, updated_at): RawRow) -> StorageResult<Entity> {
    Ok(Entity {
        id: EntityId::new(id),
        payload: serde_json::from_str(&payload)?,
        created_at: Timestamp::from_millis(created_at),
        updated_at: Timestamp::from_millis(updated_at),
    })
}
