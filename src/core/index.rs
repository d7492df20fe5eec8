//! Metadata index
//!
//! Information Hiding:
//! - Persisted layout (a JSON array under a reserved key) hidden from callers
//! - Loaded lazily on first use, then authoritative in memory
//! - Entries kept sorted by `updated_at`, newest first, with unique keys

use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub key: String,
    /// Milliseconds since the Unix epoch of the last write
    pub updated_at: u64,
    /// Approximate stored size in bytes
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

pub struct MetadataIndex {
    storage_key: String,
    entries: Vec<IndexEntry>,
    loaded: bool,
    dirty: bool,
}

impl MetadataIndex {
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            entries: Vec::new(),
            loaded: false,
            dirty: false,
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Read the persisted index once. Missing or corrupt data yields an empty index.
    pub fn load(&mut self, store: &dyn KeyValueStore) {
        if self.loaded {
            return;
        }
        self.loaded = true;

        let raw = match store.get(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("[MetadataIndex] Failed to read index, starting empty: {}", e);
                return;
            }
        };

        match serde_json::from_str::<Vec<IndexEntry>>(&raw) {
            Ok(entries) => {
                self.entries = entries;
                self.normalize();
                tracing::debug!("[MetadataIndex] Loaded {} entries", self.entries.len());
            }
            Err(e) => {
                tracing::warn!("[MetadataIndex] Corrupt index, resetting: {}", e);
                self.entries.clear();
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Sort newest first and drop duplicate keys, keeping the newest
    fn normalize(&mut self) {
        self.entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let mut seen = HashSet::new();
        self.entries.retain(|entry| seen.insert(entry.key.clone()));
    }

    pub fn upsert(&mut self, entry: IndexEntry) {
        self.entries.retain(|existing| existing.key != entry.key);
        self.entries.push(entry);
        self.entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<IndexEntry> {
        let position = self.entries.iter().position(|entry| entry.key == key)?;
        self.dirty = true;
        Some(self.entries.remove(position))
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Entries newest first
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Entries oldest first, the eviction order
    pub fn oldest_first(&self) -> Vec<IndexEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn total_size(&self) -> usize {
        self.entries.iter().map(|entry| entry.size).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the index if it changed. Failures are logged and leave the
    /// index dirty; the next mutation schedules another attempt.
    pub fn flush(&mut self, store: &dyn KeyValueStore) -> bool {
        if !self.dirty {
            return true;
        }
        let raw = match serde_json::to_string(&self.entries) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("[MetadataIndex] Failed to serialize index: {}", e);
                return false;
            }
        };
        match store.set(&self.storage_key, &raw) {
            Ok(()) => {
                self.dirty = false;
                tracing::debug!("[MetadataIndex] Flushed {} entries", self.entries.len());
                true
            }
            Err(e) => {
                tracing::error!("[MetadataIndex] Index flush failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn entry(key: &str, updated_at: u64, size: usize) -> IndexEntry {
        IndexEntry {
            key: key.to_string(),
            updated_at,
            size,
            count: None,
        }
    }

    #[test]
    fn test_upsert_sorts_newest_first_without_duplicates() {
        let mut index = MetadataIndex::new("ns:__index__");
        index.upsert(entry("a", 1, 10));
        index.upsert(entry("b", 3, 10));
        index.upsert(entry("c", 2, 10));
        index.upsert(entry("a", 4, 20));

        let keys: Vec<&str> = index.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(index.get("a").unwrap().size, 20);
        assert_eq!(index.total_size(), 40);
    }

    #[test]
    fn test_remove_marks_dirty_only_when_present() {
        let store = InMemoryStore::new();
        let mut index = MetadataIndex::new("ns:__index__");
        index.upsert(entry("a", 1, 10));
        assert!(index.flush(&store));
        assert!(!index.is_dirty());

        assert!(index.remove("missing").is_none());
        assert!(!index.is_dirty());

        assert!(index.remove("a").is_some());
        assert!(index.is_dirty());
    }

    #[test]
    fn test_flush_and_reload() {
        let store = InMemoryStore::new();
        let mut index = MetadataIndex::new("ns:__index__");
        index.upsert(entry("a", 1, 10));
        index.upsert(entry("b", 2, 30));
        assert!(index.flush(&store));

        let raw = store.get("ns:__index__").unwrap().unwrap();
        assert!(raw.contains("\"updatedAt\":2"));

        let mut reloaded = MetadataIndex::new("ns:__index__");
        reloaded.load(&store);
        assert_eq!(reloaded.entries(), index.entries());
    }

    #[test]
    fn test_corrupt_index_resets_to_empty() {
        let store = InMemoryStore::new();
        store.set("ns:__index__", "{garbage").unwrap();

        let mut index = MetadataIndex::new("ns:__index__");
        index.load(&store);
        assert!(index.is_loaded());
        assert!(index.is_empty());
    }

    #[test]
    fn test_load_deduplicates_persisted_entries() {
        let store = InMemoryStore::new();
        store
            .set(
                "ns:__index__",
                r#"[{"key":"a","updatedAt":1,"size":5},{"key":"a","updatedAt":9,"size":7}]"#,
            )
            .unwrap();

        let mut index = MetadataIndex::new("ns:__index__");
        index.load(&store);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a").unwrap().updated_at, 9);
    }

    #[test]
    fn test_failed_flush_stays_dirty() {
        let store = InMemoryStore::with_quota(8);
        let mut index = MetadataIndex::new("ns:__index__");
        index.upsert(entry("a", 1, 10));

        assert!(!index.flush(&store));
        assert!(index.is_dirty());
    }
}
