//! Approximate store usage
//!
//! Indexed conversations contribute their recorded size; anything else in the
//! store (the index itself, stray or unmanaged keys) is measured directly.

use super::index::MetadataIndex;
use crate::config::ChatListConfig;
use crate::storage::{entry_footprint, KeyValueStore};

pub fn rough_usage(store: &dyn KeyValueStore, index: &MetadataIndex) -> usize {
    let keys = match store.keys() {
        Ok(keys) => keys,
        Err(e) => {
            tracing::warn!("[Usage] Failed to list store keys: {}", e);
            return index.total_size();
        }
    };

    let scanned: usize = keys
        .iter()
        .filter(|key| index.is_empty() || !index.contains(key))
        .filter_map(|key| match store.get(key) {
            Ok(Some(value)) => Some(entry_footprint(key, &value)),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("[Usage] Skipping unreadable key '{}': {}", key, e);
                None
            }
        })
        .sum();

    index.total_size() + scanned
}

/// Whether projected usage after writing `incoming_bytes` crosses either global ratio.
/// A zero quota disables proactive eviction.
pub fn should_proactively_evict(current_usage: usize, incoming_bytes: usize, config: &ChatListConfig) -> bool {
    if config.global_quota_bytes == 0 {
        return false;
    }
    let projected = (current_usage + incoming_bytes) as f64 / config.global_quota_bytes as f64;
    projected >= config.global_soft_ratio || projected >= config.global_hard_ratio
}
