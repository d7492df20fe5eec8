//! SQLite Key/Value Store
//!
//! Information Hiding:
//! - Table layout and SQL hidden behind the port
//! - Connection serialized through a Mutex so the store stays `Sync`

use super::{entry_footprint, KeyValueStore};
use crate::error::{StoreError, StoreResult};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite store - every key is one row of the `kv` table
pub struct SqliteStore {
    conn: Mutex<Connection>,
    quota_bytes: Option<usize>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open sqlite store at {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            quota_bytes: None,
        })
    }

    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;

        if let Some(quota) = self.quota_bytes {
            let mut stmt = conn.prepare("SELECT key, value FROM kv WHERE key <> ?1")?;
            let rows = stmt.query_map(params![key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut used = 0;
            for row in rows {
                let (k, v) = row?;
                used += entry_footprint(&k, &v);
            }
            let requested = entry_footprint(key, value);
            if used + requested > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available: quota.saturating_sub(used),
                });
            }
        }

        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        tracing::debug!("[SqliteStore] Stored '{}'", key);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        tracing::debug!("[SqliteStore] Removed '{}'", key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM kv")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_remove() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("k", "[1]").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("[1]"));

        store.set("k", "[2]").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("[2]"));

        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_quota_enforced() {
        let store = SqliteStore::in_memory().unwrap().with_quota(Some(20));
        store.set("a", "123456789").unwrap();
        assert!(store.set("b", "x").unwrap_err().is_quota_exceeded());
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chats.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("a", "1").unwrap();
            store.set("b", "2").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
