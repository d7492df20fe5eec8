//! Key/Value Storage Port
//!
//! Information Hiding:
//! - Backend implementation details hidden behind a synchronous trait
//! - Allows swapping between memory, filesystem and SQLite without touching
//!   the trimming/eviction pipeline
//! - Each backend enforces its own notion of quota and reports it through
//!   `StoreError::QuotaExceeded`

use crate::error::StoreResult;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod filesystem;
pub mod memory;
pub mod sqlite;

pub use filesystem::FileSystemStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Trait defining the quota-constrained string store the engine persists into.
///
/// All calls are synchronous and may block the caller briefly.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    /// Returns `None` if the key doesn't exist
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// List every key currently held by the store
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Check if a key exists
    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Approximate footprint of one stored entry: 2 bytes per UTF-16 unit of key and value.
pub fn entry_footprint(key: &str, value: &str) -> usize {
    (key.encode_utf16().count() + value.encode_utf16().count()) * 2
}

/// Backend selection, driven by settings rather than by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-memory store with a browser-like quota (lost on process termination)
    #[default]
    Memory,
    /// One JSON file per key under a base directory
    Filesystem,
    /// Single SQLite table
    Sqlite,
}

/// Construct a backend from its kind, base path and optional quota
pub fn open_backend(
    kind: BackendKind,
    path: PathBuf,
    quota_bytes: Option<usize>,
) -> Result<Box<dyn KeyValueStore>> {
    let store: Box<dyn KeyValueStore> = match kind {
        BackendKind::Memory => Box::new(match quota_bytes {
            Some(quota) => InMemoryStore::with_quota(quota),
            None => InMemoryStore::new(),
        }),
        BackendKind::Filesystem => Box::new(FileSystemStore::new(path)?.with_quota(quota_bytes)),
        BackendKind::Sqlite => Box::new(SqliteStore::open(path)?.with_quota(quota_bytes)),
    };
    tracing::info!("Opened {:?} storage backend", kind);
    Ok(store)
}
