//! Namespace-scoped blob storage for the persistent media tier.
//!
//! Rows carry their own access bookkeeping (`last_accessed_at`,
//! `access_count`) and expiry so eviction and purging are single indexed
//! queries.

use crate::error::StorageResult;
use crate::{lock, open_sqlite, open_sqlite_in_memory, Namespace, SharedConnection};
use murmur_types::Timestamp;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// One persisted blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobRecord {
    /// Cache key (`quality|url`).
    pub key: String,
    /// Source URL, shared by every quality variant.
    pub url: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub access_count: u64,
    pub expires_at: Timestamp,
}

/// Keys and bytes removed by an eviction or purge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub removed: Vec<String>,
    pub freed_bytes: u64,
}

/// SQLite-backed blob store.
pub struct BlobStore {
    conn: SharedConnection,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore").finish_non_exhaustive()
    }
}

impl BlobStore {
    /// Opens (or creates) a blob store in the database file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_conn(open_sqlite(path)?)
    }

    /// Opens a blob store backed by a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open_with_conn(open_sqlite_in_memory()?)
    }

    /// Opens a blob store on an existing connection.
    pub fn open_with_conn(conn: SharedConnection) -> StorageResult<Self> {
        init_schema(&*lock(&conn)?)?;
        Ok(Self { conn })
    }

    /// Inserts or replaces a blob.
    pub fn put(&self, ns: &Namespace, record: &BlobRecord) -> StorageResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO blobs (namespace, key, url, bytes, mime_type, size_bytes,
                                created_at, last_accessed_at, access_count, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(namespace, key) DO UPDATE SET
                url = excluded.url,
                bytes = excluded.bytes,
                mime_type = excluded.mime_type,
                size_bytes = excluded.size_bytes,
                created_at = excluded.created_at,
                last_accessed_at = excluded.last_accessed_at,
                access_count = excluded.access_count,
                expires_at = excluded.expires_at",
            params![
                ns.as_str(),
                record.key,
                record.url,
                record.bytes,
                record.mime_type,
                record.size_bytes as i64,
                record.created_at.as_millis(),
                record.last_accessed_at.as_millis(),
                record.access_count as i64,
                record.expires_at.as_millis(),
            ],
        )?;
        Ok(())
    }

    /// Reads a blob, expired or not. Callers decide what expiry means.
    pub fn get(&self, ns: &Namespace, key: &str) -> StorageResult<Option<BlobRecord>> {
        let conn = lock(&self.conn)?;
        let record = conn
            .query_row(
                "SELECT key, url, bytes, mime_type, size_bytes, created_at,
                        last_accessed_at, access_count, expires_at
                 FROM blobs WHERE namespace = ?1 AND key = ?2",
                params![ns.as_str(), key],
                read_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Records an access. Returns whether the blob exists.
    pub fn touch(&self, ns: &Namespace, key: &str, at: Timestamp) -> StorageResult<bool> {
        let conn = lock(&self.conn)?;
        let updated = conn.execute(
            "UPDATE blobs SET last_accessed_at = ?3, access_count = access_count + 1
             WHERE namespace = ?1 AND key = ?2",
            params![ns.as_str(), key, at.as_millis()],
        )?;
        Ok(updated > 0)
    }

    /// Deletes one blob. Returns whether it existed.
    pub fn delete(&self, ns: &Namespace, key: &str) -> StorageResult<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM blobs WHERE namespace = ?1 AND key = ?2",
            params![ns.as_str(), key],
        )?;
        Ok(removed > 0)
    }

    /// Deletes every variant stored for a source URL.
    pub fn delete_url(&self, ns: &Namespace, url: &str) -> StorageResult<Vec<String>> {
        let conn = lock(&self.conn)?;
        let keys = select_keys(
            &conn,
            "SELECT key FROM blobs WHERE namespace = ?1 AND url = ?2",
            params![ns.as_str(), url],
        )?;
        conn.execute(
            "DELETE FROM blobs WHERE namespace = ?1 AND url = ?2",
            params![ns.as_str(), url],
        )?;
        Ok(keys)
    }

    /// Deletes every blob in a namespace.
    pub fn clear(&self, ns: &Namespace) -> StorageResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM blobs WHERE namespace = ?1", params![ns.as_str()])?;
        Ok(())
    }

    /// Total stored bytes in a namespace.
    pub fn total_bytes(&self, ns: &Namespace) -> StorageResult<u64> {
        let conn = lock(&self.conn)?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM blobs WHERE namespace = ?1",
            params![ns.as_str()],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    /// Number of blobs in a namespace.
    pub fn count(&self, ns: &Namespace) -> StorageResult<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blobs WHERE namespace = ?1",
            params![ns.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Evicts the least recently accessed `fraction` of blobs (at least one
    /// when the namespace is not empty).
    pub fn evict_least_recent(&self, ns: &Namespace, fraction: f64) -> StorageResult<EvictionReport> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blobs WHERE namespace = ?1",
            params![ns.as_str()],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Ok(EvictionReport::default());
        }
        let n = ((count as f64) * fraction.clamp(0.0, 1.0)).ceil().max(1.0) as i64;
        let report = remove_where(
            &conn,
            ns,
            "SELECT key, size_bytes FROM blobs WHERE namespace = ?1
             ORDER BY last_accessed_at ASC, key ASC LIMIT ?2",
            n,
        )?;
        debug!(
            "Evicted {} blobs ({} bytes) from namespace {}",
            report.removed.len(),
            report.freed_bytes,
            ns
        );
        Ok(report)
    }

    /// Removes every blob with `expires_at <= now`.
    pub fn purge_expired(&self, ns: &Namespace, now: Timestamp) -> StorageResult<EvictionReport> {
        let conn = lock(&self.conn)?;
        remove_where(
            &conn,
            ns,
            "SELECT key, size_bytes FROM blobs WHERE namespace = ?1 AND expires_at <= ?2",
            now.as_millis(),
        )
    }
}

fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS blobs (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            url TEXT NOT NULL,
            bytes BLOB NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            last_accessed_at INTEGER NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            expires_at INTEGER NOT NULL,
            PRIMARY KEY (namespace, key)
        );

        CREATE INDEX IF NOT EXISTS idx_blobs_accessed
            ON blobs (namespace, last_accessed_at);

        CREATE INDEX IF NOT EXISTS idx_blobs_expires
            ON blobs (namespace, expires_at);

        CREATE INDEX IF NOT EXISTS idx_blobs_url
            ON blobs (namespace, url);
        ",
    )?;
    Ok(())
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<BlobRecord> {
    Ok(BlobRecord {
        key: row.get(0)?,
        url: row.get(1)?,
        bytes: row.get(2)?,
        mime_type: row.get(3)?,
        size_bytes: row.get::<_, i64>(4)? as u64,
        created_at: Timestamp::from_millis(row.get(5)?),
        last_accessed_at: Timestamp::from_millis(row.get(6)?),
        access_count: row.get::<_, i64>(7)? as u64,
        expires_at: Timestamp::from_millis(row.get(8)?),
    })
}

fn select_keys(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let keys = stmt
        .query_map(args, |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

/// Selects `(key, size)` pairs with `select` (bound to namespace and one
/// extra argument) and deletes them.
fn remove_where(conn: &Connection, ns: &Namespace, select: &str, arg: i64) -> StorageResult<EvictionReport> {
    let victims = {
        let mut stmt = conn.prepare(select)?;
        stmt.query_map(params![ns.as_str(), arg], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?
    };

    let mut report = EvictionReport::default();
    for (key, size) in victims {
        conn.execute(
            "DELETE FROM blobs WHERE namespace = ?1 AND key = ?2",
            params![ns.as_str(), key],
        )?;
        report.freed_bytes += size as u64;
        report.removed.push(key);
    }
    Ok(report)
}
