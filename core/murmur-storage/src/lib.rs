//! SQLite storage layer for the Murmur client core.
//!
//! Provides the two persistent stores a session needs:
//! - [`EntityStore`]: publications, keyed by id, paged locally
//! - [`BlobStore`]: the persistent tier of the media cache
//!
//! # Isolation
//!
//! Every row carries a [`Namespace`] derived from the authenticated user.
//! Stores opened for different users never see each other's rows, even
//! when they share one database file on a shared device.

mod blob_store;
mod entity_store;
mod error;
mod namespace;

pub use blob_store::{BlobRecord, BlobStore, EvictionReport};
pub use entity_store::{EntityStore, EntityStoreConfig, UpsertOutcome};
pub use error::{StorageError, StorageResult};
pub use namespace::Namespace;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Shared handle to one SQLite connection.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Opens a SQLite database with the pragmas both stores expect.
///
/// If the file cannot be opened and a stale `-wal` file sits next to it,
/// the WAL is removed and the open is retried once. This handles the
/// common case where an unclean shutdown leaves a WAL that blocks reopen.
pub fn open_sqlite(path: &Path) -> StorageResult<SharedConnection> {
    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(first_err) => {
            let mut wal = path.as_os_str().to_owned();
            wal.push("-wal");
            let wal_path = std::path::PathBuf::from(wal);
            if wal_path.exists() {
                warn!(
                    "SQLite open failed, removing stale WAL and retrying: {}",
                    wal_path.display()
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    Connection::open(path)?
                } else {
                    return Err(first_err.into());
                }
            } else {
                return Err(first_err.into());
            }
        }
    };
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Opens a private in-memory database.
pub fn open_sqlite_in_memory() -> StorageResult<SharedConnection> {
    Ok(Arc::new(Mutex::new(Connection::open_in_memory()?)))
}

pub(crate) fn lock(conn: &SharedConnection) -> StorageResult<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| StorageError::LockPoisoned)
}
