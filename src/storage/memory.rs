//! In-Memory Key/Value Store
//!
//! Information Hiding:
//! - HashMap storage structure hidden from users
//! - Thread-safe access via RwLock hidden behind the synchronous port
//! - Quota accounting mirrors browser local storage (UTF-16, key + value)

use super::{entry_footprint, KeyValueStore};
use crate::error::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Browser local storage typically allows about 5M UTF-16 units per origin.
pub const DEFAULT_QUOTA_BYTES: usize = 10 * 1024 * 1024;

/// In-memory store using HashMap
/// Data is lost when process terminates
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes,
        }
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    /// Bytes currently occupied according to the quota measure
    pub fn used_bytes(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.iter().map(|(k, v)| entry_footprint(k, v)).sum(),
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;

        let used: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| entry_footprint(k, v))
            .sum();
        let requested = entry_footprint(key, value);

        if used + requested > self.quota_bytes {
            tracing::debug!(
                "[InMemoryStore] Rejected write of {} bytes for '{}' ({} of {} used)",
                requested,
                key,
                used,
                self.quota_bytes
            );
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
                requested,
                available: self.quota_bytes.saturating_sub(used),
            });
        }

        entries.insert(key.to_string(), value.to_string());
        tracing::debug!("[InMemoryStore] Stored {} bytes for '{}'", requested, key);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        tracing::debug!("[InMemoryStore] Removed '{}'", key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.contains_key(key))
    }
}
