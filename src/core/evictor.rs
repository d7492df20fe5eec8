//! Whole-conversation eviction, least recently written first

use super::index::MetadataIndex;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionStats {
    pub requested_bytes: usize,
    pub freed_bytes: usize,
    pub evicted_keys: Vec<String>,
    pub proactive: bool,
}

impl EvictionStats {
    pub fn is_empty(&self) -> bool {
        self.evicted_keys.is_empty()
    }

    pub fn satisfied(&self) -> bool {
        self.freed_bytes >= self.requested_bytes
    }
}

/// Remove indexed conversations, oldest `updated_at` first, until at least
/// `required_bytes` are freed or nothing evictable is left. `exclude` is never
/// touched. A conversation whose store entry can't be removed stays indexed.
pub fn evict(
    store: &dyn KeyValueStore,
    index: &mut MetadataIndex,
    required_bytes: usize,
    proactive: bool,
    exclude: Option<&str>,
) -> EvictionStats {
    let mut stats = EvictionStats {
        requested_bytes: required_bytes,
        proactive,
        ..Default::default()
    };
    if required_bytes == 0 {
        return stats;
    }

    for candidate in index.oldest_first() {
        if stats.freed_bytes >= required_bytes {
            break;
        }
        if exclude == Some(candidate.key.as_str()) {
            continue;
        }
        if let Err(e) = store.remove(&candidate.key) {
            tracing::warn!("[Evictor] Failed to evict '{}': {}", candidate.key, e);
            continue;
        }
        index.remove(&candidate.key);
        stats.freed_bytes += candidate.size;
        stats.evicted_keys.push(candidate.key);
    }

    if !stats.is_empty() {
        tracing::info!(
            "[Evictor] Evicted {} conversations, freed {} of {} bytes (proactive: {})",
            stats.evicted_keys.len(),
            stats.freed_bytes,
            required_bytes,
            proactive
        );
    }
    stats
}
