//! Durable store connection management.
//!
//! The SQLite handle is opened lazily on first use, at most once per store,
//! and can be closed and deleted before being recreated.

use super::{Table, migrations};
use crate::Error;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio_rusqlite::{Connection, params, rusqlite};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// Primary durable store.
///
/// Wraps a tokio-rusqlite Connection that runs database operations on a
/// background thread.
#[derive(Debug)]
pub struct DurableStore {
    location: Location,
    conn: Mutex<Option<Connection>>,
}

impl DurableStore {
    /// Store backed by a database file. Nothing is opened until first use.
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self { location: Location::File(path.as_ref().to_path_buf()), conn: Mutex::new(None) }
    }

    /// Store backed by an in-memory database, for tests and ephemeral sessions.
    pub fn in_memory() -> Self {
        Self { location: Location::Memory, conn: Mutex::new(None) }
    }

    /// Open a file-backed store immediately.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let store = Self::at_path(path);
        store.handle().await?;
        Ok(store)
    }

    /// Open an in-memory store immediately.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let store = Self::in_memory();
        store.handle().await?;
        Ok(store)
    }

    /// Whether the handle is currently open.
    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Get the connection, opening it and running migrations if needed.
    async fn handle(&self) -> Result<Connection, Error> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        Error::StoreUnavailable(format!("cannot create {}: {e}", parent.display()))
                    })?;
                }
                Connection::open(path)
                    .await
                    .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", path.display())))?
            }
            Location::Memory => Connection::open_in_memory()
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?,
        };

        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        tracing::debug!(location = ?self.location, "durable store opened");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Read the raw JSON value stored under `key`.
    pub async fn get(&self, table: Table, key: &str) -> Result<Option<String>, Error> {
        let conn = self.handle().await?;
        let key = key.to_string();
        let sql = format!("SELECT value FROM {} WHERE key = ?1", table.name());
        conn.call(move |conn| -> Result<Option<String>, Error> {
            let result = conn.query_row(&sql, params![key], |row| row.get(0));
            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(Error::from)
    }

    /// Insert or replace the raw JSON value stored under `key`.
    pub async fn put(&self, table: Table, key: &str, value: String) -> Result<(), Error> {
        let conn = self.handle().await?;
        let key = key.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {} (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            table.name()
        );
        conn.call(move |conn| -> Result<(), Error> {
            conn.execute(&sql, params![key, value, now])?;
            Ok(())
        })
        .await
        .map_err(Error::from)
    }

    /// Remove `key` from `table`.
    pub async fn delete(&self, table: Table, key: &str) -> Result<(), Error> {
        let conn = self.handle().await?;
        let key = key.to_string();
        let sql = format!("DELETE FROM {} WHERE key = ?1", table.name());
        conn.call(move |conn| -> Result<(), Error> {
            conn.execute(&sql, params![key])?;
            Ok(())
        })
        .await
        .map_err(Error::from)
    }

    /// Approximate bytes held by `table`, counting key and value characters.
    pub async fn table_chars(&self, table: Table) -> Result<u64, Error> {
        let conn = self.handle().await?;
        let sql = format!("SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM {}", table.name());
        conn.call(move |conn| -> Result<u64, Error> {
            let chars: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(chars.max(0) as u64)
        })
        .await
        .map_err(Error::from)
    }

    /// Close the handle, leaving the store to reopen on next use.
    pub async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "failed to close durable store cleanly");
            }
        }
    }

    /// Delete every stored entry.
    ///
    /// File-backed stores are closed and their files removed; the next
    /// operation recreates an empty database. In-memory stores are emptied
    /// in place.
    pub async fn delete_database(&self) -> Result<(), Error> {
        match &self.location {
            Location::File(path) => {
                self.close().await;
                for suffix in ["", "-wal", "-shm"] {
                    let mut file = path.clone().into_os_string();
                    file.push(suffix);
                    match std::fs::remove_file(&file) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                tracing::info!(path = %path.display(), "durable store deleted");
                Ok(())
            }
            Location::Memory => {
                let conn = self.handle().await?;
                conn.call(|conn| -> Result<(), Error> {
                    conn.execute_batch("DELETE FROM keyval; DELETE FROM queues; DELETE FROM caches;")?;
                    Ok(())
                })
                .await
                .map_err(Error::from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lazy_open() {
        let store = DurableStore::in_memory();
        assert!(!store.is_open().await);
        assert!(store.get(Table::KeyVal, "missing").await.unwrap().is_none());
        assert!(store.is_open().await);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = DurableStore::open_in_memory().await.unwrap();
        store.put(Table::Queues, "offline_invoices", "[1]".into()).await.unwrap();
        store.put(Table::Queues, "offline_invoices", "[1,2]".into()).await.unwrap();

        let value = store.get(Table::Queues, "offline_invoices").await.unwrap();
        assert_eq!(value.as_deref(), Some("[1,2]"));
        assert!(store.get(Table::Caches, "offline_invoices").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_key_leaves_other_tables() {
        let store = DurableStore::open_in_memory().await.unwrap();
        store.put(Table::Caches, "offers_cache", "[]".into()).await.unwrap();
        store.put(Table::KeyVal, "offers_cache", "[]".into()).await.unwrap();

        store.delete(Table::Caches, "offers_cache").await.unwrap();
        store.delete(Table::Caches, "never_written").await.unwrap();

        assert!(store.get(Table::Caches, "offers_cache").await.unwrap().is_none());
        assert_eq!(store.get(Table::KeyVal, "offers_cache").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_delete_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite");
        let store = DurableStore::open(&path).await.unwrap();
        store.put(Table::KeyVal, "cache_version", "1".into()).await.unwrap();

        store.delete_database().await.unwrap();
        assert!(!store.is_open().await);
        assert!(!path.exists());

        assert!(store.get(Table::KeyVal, "cache_version").await.unwrap().is_none());
        assert!(store.is_open().await);
    }

    #[tokio::test]
    async fn test_table_chars() {
        let store = DurableStore::open_in_memory().await.unwrap();
        assert_eq!(store.table_chars(Table::Caches).await.unwrap(), 0);
        store.put(Table::Caches, "abc", "12345".into()).await.unwrap();
        assert_eq!(store.table_chars(Table::Caches).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_unavailable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = DurableStore::at_path(blocker.join("cache.sqlite"));
        let result = store.get(Table::KeyVal, "k").await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }
}
