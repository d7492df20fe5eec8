//! Chat List Store - the bounded persistence engine
//!
//! Information Hiding:
//! - Trimming, eviction and retry policy hidden behind save/get/delete
//! - Metadata index, dedupe cache and single-flight guard owned here and
//!   nowhere else
//! - Public operations never return errors; failures are reported through
//!   `SaveResult` and the registered hooks

use super::codec::{self, MessageLog};
use super::evictor::{self, EvictionStats};
use super::hooks::{ChatListHooks, QuotaEvent, TrimEvent, TrimStage};
use super::index::{IndexEntry, MetadataIndex};
use super::key::{index_key, ChatKind, ConversationKey};
use super::scheduler::{IdleTask, TaskQueue};
use super::trimmer::{self, Trimmed};
use super::usage;
use crate::config::{ChatListConfig, ChatListConfigPatch, Settings};
use crate::storage::{self, KeyValueStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Record of one save attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveResult {
    pub key: String,
    pub original_bytes: usize,
    pub final_bytes: usize,
    pub original_count: usize,
    pub final_count: usize,
    pub trimmed_by_count: bool,
    pub trimmed_soft: bool,
    /// The soft stage was skipped because sampled entries were mostly references
    pub soft_trim_relaxed: bool,
    pub trimmed_hard: bool,
    /// Proactive eviction performed before the write
    pub eviction: Option<EvictionStats>,
    /// Eviction performed after a quota failure, before the retry
    pub retry_eviction: Option<EvictionStats>,
    pub eviction_attempts: usize,
    pub quota_exceeded: bool,
    pub quota_final_failure: bool,
    /// Content matched the last successful write; nothing was written
    pub deduplicated: bool,
    /// Another write for this key was in progress; this one was dropped
    pub skipped_in_flight: bool,
    pub written: bool,
    pub success: bool,
    pub updated_at: Option<u64>,
    pub error: Option<String>,
}

impl SaveResult {
    pub fn trimmed(&self) -> bool {
        self.trimmed_by_count || self.trimmed_soft || self.trimmed_hard
    }
}

/// What `save_chat_list` hands back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Possibly trimmed log the caller should adopt
    pub data: MessageLog,
    /// True when trimming altered the log
    pub changed: bool,
    pub meta: SaveResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub conversations: usize,
    pub indexed_bytes: usize,
    pub rough_usage_bytes: usize,
    pub quota_bytes: usize,
    pub usage_ratio: f64,
}

struct StageRecord {
    stage: TrimStage,
    before_count: usize,
    after_count: usize,
    before_bytes: usize,
    after_bytes: usize,
}

struct Limited {
    data: MessageLog,
    size: usize,
    stages: Vec<StageRecord>,
    soft_relaxed: bool,
}

fn run_stage(
    stage: TrimStage,
    data: MessageLog,
    size: usize,
    stages: &mut Vec<StageRecord>,
    trim: impl FnOnce(MessageLog) -> Trimmed,
) -> (MessageLog, usize) {
    let before_count = data.len();
    let Trimmed { data, trimmed } = trim(data);
    if !trimmed {
        return (data, size);
    }
    let after = codec::size(&data);
    stages.push(StageRecord {
        stage,
        before_count,
        after_count: data.len(),
        before_bytes: size,
        after_bytes: after,
    });
    (data, after)
}

/// Count trim, soft trim (unless relaxed), hard trim. Shared by the write
/// pipeline and the runtime trim.
fn enforce_limits(config: &ChatListConfig, log: MessageLog) -> Limited {
    let mut stages = Vec::new();
    let size = codec::size(&log);

    let (data, size) = run_stage(TrimStage::Count, log, size, &mut stages, |data| {
        trimmer::trim_by_count(data, config.max_messages)
    });

    let mut soft_relaxed = false;
    let (data, size) = if size > config.soft_chat_bytes {
        if config.relax_soft_trim
            && trimmer::mostly_references(&data, config.reference_sample_size, config.reference_skip_ratio)
        {
            soft_relaxed = true;
            (data, size)
        } else {
            let target = config.soft_target_bytes();
            run_stage(TrimStage::Soft, data, size, &mut stages, |data| {
                trimmer::trim_by_size(data, target)
            })
        }
    } else {
        (data, size)
    };

    let (data, size) = if size > config.hard_chat_bytes {
        run_stage(TrimStage::Hard, data, size, &mut stages, |data| {
            trimmer::trim_to_ceiling(data, config.hard_chat_bytes)
        })
    } else {
        (data, size)
    };

    Limited {
        data,
        size,
        stages,
        soft_relaxed,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct ChatListStore {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    config: ChatListConfig,
    index: MetadataIndex,
    hooks: ChatListHooks,
    tasks: TaskQueue,
    last_written: HashMap<String, String>,
    /// Keys with a write in progress. `&mut self` and the store actor
    /// already serialize writes, so this only guards the pipeline itself.
    in_flight: HashSet<String>,
    pending_saves: HashMap<String, (ConversationKey, MessageLog)>,
    legacy_purged: bool,
    last_stamp: u64,
    last_result: Option<SaveResult>,
}

impl ChatListStore {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>, config: ChatListConfig) -> Self {
        let namespace = namespace.into();
        let mut config = config;
        config.validate();
        Self {
            store,
            index: MetadataIndex::new(index_key(&namespace)),
            namespace,
            config,
            hooks: ChatListHooks::default(),
            tasks: TaskQueue::new(),
            last_written: HashMap::new(),
            in_flight: HashSet::new(),
            pending_saves: HashMap::new(),
            legacy_purged: false,
            last_stamp: 0,
            last_result: None,
        }
    }

    /// Open the configured backend and build an engine on top of it
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let backend = storage::open_backend(
            settings.storage.backend,
            settings.storage.path.clone(),
            settings.storage.quota_bytes,
        )?;
        Ok(Self::new(
            Arc::from(backend),
            settings.storage.namespace.clone(),
            settings.limits.clone(),
        ))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Build a key in this engine's namespace
    pub fn key(&self, host: &str, port: u16, kind: ChatKind, chat_id: &str) -> ConversationKey {
        ConversationKey::new(self.namespace.clone(), host, port, kind, chat_id)
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn config(&self) -> &ChatListConfig {
        &self.config
    }

    pub fn configure(&mut self, patch: ChatListConfigPatch) {
        self.config.apply(patch);
        tracing::debug!("[ChatListStore] Configuration updated: {:?}", self.config);
    }

    pub fn register_hooks(&mut self, hooks: ChatListHooks) {
        self.hooks.merge(hooks);
    }

    pub fn last_result(&self) -> Option<&SaveResult> {
        self.last_result.as_ref()
    }

    fn ensure_index(&mut self) {
        self.index.load(self.store.as_ref());
    }

    pub fn index_entries(&mut self) -> Vec<IndexEntry> {
        self.ensure_index();
        self.index.entries().to_vec()
    }

    pub fn rough_usage(&mut self) -> usize {
        self.ensure_index();
        usage::rough_usage(self.store.as_ref(), &self.index)
    }

    pub fn usage_report(&mut self) -> UsageReport {
        let rough = self.rough_usage();
        let quota = self.config.global_quota_bytes;
        UsageReport {
            conversations: self.index.len(),
            indexed_bytes: self.index.total_size(),
            rough_usage_bytes: rough,
            quota_bytes: quota,
            usage_ratio: if quota == 0 { 0.0 } else { rough as f64 / quota as f64 },
        }
    }

    /// Read a conversation. Queued content wins over the stored copy;
    /// missing or corrupt data yields `None`.
    pub fn get_chat_list(&self, key: &ConversationKey) -> Option<MessageLog> {
        let storage_key = key.storage_key();
        if let Some((_, pending)) = self.pending_saves.get(&storage_key) {
            return Some(pending.clone());
        }
        match self.store.get(&storage_key) {
            Ok(Some(raw)) => {
                let log = codec::deserialize(&raw);
                if log.is_none() {
                    tracing::warn!("[ChatListStore] Corrupt chat list at '{}'", storage_key);
                }
                log
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("[ChatListStore] Failed to read '{}': {}", storage_key, e);
                None
            }
        }
    }

    pub fn delete_chat_list(&mut self, key: &ConversationKey) {
        self.ensure_index();
        let storage_key = key.storage_key();

        if let Err(e) = self.store.remove(&storage_key) {
            tracing::error!("[ChatListStore] Failed to delete '{}': {}", storage_key, e);
        }
        if self.index.remove(&storage_key).is_some() {
            self.tasks.schedule(IdleTask::FlushIndex);
        }
        self.last_written.remove(&storage_key);
        self.pending_saves.remove(&storage_key);
        tracing::debug!("[ChatListStore] Deleted '{}'", storage_key);
    }

    /// Apply count and size limits in memory only
    pub fn runtime_trim(&self, log: MessageLog) -> MessageLog {
        enforce_limits(&self.config, log).data
    }

    /// Run the full write pipeline for one conversation
    pub fn save_chat_list(&mut self, key: &ConversationKey, log: MessageLog) -> SaveOutcome {
        let storage_key = key.storage_key();
        // A direct save supersedes anything queued for the same key
        self.pending_saves.remove(&storage_key);
        self.persist(storage_key, log)
    }

    /// Runtime-trim `log`, hold it as the pending content for `key` and
    /// persist it on the next idle pass. Returns the trimmed log.
    pub fn queue_save(&mut self, key: &ConversationKey, log: MessageLog) -> MessageLog {
        let data = self.runtime_trim(log);
        let storage_key = key.storage_key();
        self.pending_saves
            .insert(storage_key.clone(), (key.clone(), data.clone()));
        self.tasks.schedule(IdleTask::PersistChat(storage_key));
        data
    }

    pub fn has_pending_work(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn is_overdue(&self, max_delay: Duration) -> bool {
        self.tasks.is_overdue(max_delay)
    }

    /// Drain deferred work: queued saves first, then the index flush they cause.
    pub fn run_idle_tasks(&mut self) -> Vec<SaveResult> {
        let mut results = Vec::new();
        while !self.tasks.is_empty() {
            for task in self.tasks.drain() {
                match task {
                    IdleTask::PersistChat(storage_key) => {
                        if let Some((_, log)) = self.pending_saves.remove(&storage_key) {
                            results.push(self.persist(storage_key, log).meta);
                        }
                    }
                    IdleTask::FlushIndex => {
                        self.index.flush(self.store.as_ref());
                    }
                }
            }
        }
        results
    }

    /// Persist the index right away if it has unsaved changes
    pub fn flush_index(&mut self) -> bool {
        self.index.flush(self.store.as_ref())
    }

    /// Free at least `required_bytes` by evicting whole conversations
    pub fn evict(&mut self, required_bytes: usize, proactive: bool) -> EvictionStats {
        self.ensure_index();
        self.evict_excluding(required_bytes, proactive, None)
    }

    fn evict_excluding(&mut self, required_bytes: usize, proactive: bool, exclude: Option<&str>) -> EvictionStats {
        let stats = evictor::evict(
            self.store.as_ref(),
            &mut self.index,
            required_bytes,
            proactive,
            exclude,
        );
        if !stats.is_empty() {
            for key in &stats.evicted_keys {
                self.last_written.remove(key);
            }
            self.tasks.schedule(IdleTask::FlushIndex);
            self.hooks.evict(&stats);
        }
        stats
    }

    /// Remove keys left behind by older layouts, once per engine lifetime
    fn purge_legacy_once(&mut self) {
        if self.legacy_purged {
            return;
        }
        self.legacy_purged = true;

        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("[ChatListStore] Legacy purge skipped, cannot list keys: {}", e);
                return;
            }
        };

        let own_prefix = format!("{}:", self.namespace);
        let mut purged = 0;
        for key in keys {
            let stale_layout = key.starts_with(&own_prefix)
                && key != self.index.storage_key()
                && !self.index.contains(&key)
                && ConversationKey::parse_in(&self.namespace, &key).is_none();
            let configured = self
                .config
                .legacy_prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && key.starts_with(prefix.as_str()));
            if !(stale_layout || configured) {
                continue;
            }
            match self.store.remove(&key) {
                Ok(()) => {
                    if self.index.remove(&key).is_some() {
                        self.tasks.schedule(IdleTask::FlushIndex);
                    }
                    purged += 1;
                }
                Err(e) => tracing::warn!("[ChatListStore] Failed to purge legacy key '{}': {}", key, e),
            }
        }
        if purged > 0 {
            tracing::info!("[ChatListStore] Purged {} legacy keys", purged);
        }
    }

    /// Strictly increasing millisecond stamp, never behind what the index holds
    fn next_stamp(&mut self, storage_key: &str) -> u64 {
        let previous = self.index.get(storage_key).map(|e| e.updated_at).unwrap_or(0);
        let stamp = now_ms().max(self.last_stamp + 1).max(previous);
        self.last_stamp = stamp;
        stamp
    }

    fn persist(&mut self, storage_key: String, log: MessageLog) -> SaveOutcome {
        self.ensure_index();
        self.purge_legacy_once();

        let mut result = SaveResult {
            key: storage_key.clone(),
            original_count: log.len(),
            ..Default::default()
        };

        let limited = enforce_limits(&self.config, log);
        result.original_bytes = limited
            .stages
            .first()
            .map(|s| s.before_bytes)
            .unwrap_or(limited.size);
        result.soft_trim_relaxed = limited.soft_relaxed;
        if limited.soft_relaxed {
            tracing::debug!(
                "[ChatListStore] Soft trim skipped for '{}', content is mostly references",
                storage_key
            );
        }
        for record in &limited.stages {
            match record.stage {
                TrimStage::Count => result.trimmed_by_count = true,
                TrimStage::Soft => result.trimmed_soft = true,
                TrimStage::Hard => result.trimmed_hard = true,
            }
            self.hooks.trim(&TrimEvent {
                key: storage_key.clone(),
                stage: record.stage,
                before_count: record.before_count,
                after_count: record.after_count,
                before_bytes: record.before_bytes,
                after_bytes: record.after_bytes,
            });
        }

        let data = limited.data;
        let serialized = codec::serialize(&data);
        let final_bytes = codec::text_size(&serialized);
        result.final_bytes = final_bytes;
        result.final_count = data.len();

        let current_usage = usage::rough_usage(self.store.as_ref(), &self.index);
        if usage::should_proactively_evict(current_usage, final_bytes, &self.config) {
            let required = final_bytes + self.config.target_free_after_evict;
            let stats = self.evict_excluding(required, true, Some(storage_key.as_str()));
            result.eviction_attempts += 1;
            result.eviction = Some(stats);
        }

        if self.last_written.get(&storage_key) == Some(&serialized) {
            result.deduplicated = true;
        } else if self.in_flight.contains(&storage_key) {
            result.skipped_in_flight = true;
            tracing::debug!("[ChatListStore] Write already in flight for '{}', dropping", storage_key);
        } else {
            self.in_flight.insert(storage_key.clone());
            let written = self.write_with_retry(&storage_key, &serialized, final_bytes, &mut result);
            self.in_flight.remove(&storage_key);
            result.written = written;
            if written {
                self.last_written.insert(storage_key.clone(), serialized);
            }
        }

        if result.written || result.deduplicated {
            let stamp = self.next_stamp(&storage_key);
            self.index.upsert(IndexEntry {
                key: storage_key.clone(),
                updated_at: stamp,
                size: final_bytes,
                count: Some(data.len()),
            });
            self.tasks.schedule(IdleTask::FlushIndex);
            result.updated_at = Some(stamp);
            result.success = true;
        }

        tracing::debug!(
            "[ChatListStore] Saved '{}': {} -> {} entries, {} -> {} bytes (written: {}, deduplicated: {})",
            storage_key,
            result.original_count,
            result.final_count,
            result.original_bytes,
            result.final_bytes,
            result.written,
            result.deduplicated
        );

        self.hooks.save(&result);
        self.last_result = Some(result.clone());

        SaveOutcome {
            changed: result.trimmed(),
            data,
            meta: result,
        }
    }

    fn write_with_retry(
        &mut self,
        storage_key: &str,
        serialized: &str,
        final_bytes: usize,
        result: &mut SaveResult,
    ) -> bool {
        let error = match self.store.set(storage_key, serialized) {
            Ok(()) => return true,
            Err(e) => e,
        };

        if !error.is_quota_exceeded() {
            tracing::error!("[ChatListStore] Failed to write '{}': {}", storage_key, error);
            result.error = Some(error.to_string());
            return false;
        }

        result.quota_exceeded = true;
        tracing::warn!(
            "[ChatListStore] Quota exceeded writing '{}', evicting and retrying once",
            storage_key
        );
        self.hooks.quota_exceeded(&QuotaEvent {
            key: storage_key.to_string(),
            attempted_bytes: final_bytes,
            final_failure: false,
            error: error.to_string(),
        });

        let required = final_bytes + self.config.target_free_after_evict;
        let stats = self.evict_excluding(required, false, Some(storage_key));
        result.eviction_attempts += 1;
        result.retry_eviction = Some(stats);

        match self.store.set(storage_key, serialized) {
            Ok(()) => true,
            Err(retry_error) => {
                tracing::error!(
                    "[ChatListStore] Retry failed for '{}': {}",
                    storage_key,
                    retry_error
                );
                if retry_error.is_quota_exceeded() {
                    result.quota_final_failure = true;
                    self.hooks.quota_exceeded(&QuotaEvent {
                        key: storage_key.to_string(),
                        attempted_bytes: final_bytes,
                        final_failure: true,
                        error: retry_error.to_string(),
                    });
                }
                result.error = Some(retry_error.to_string());
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn mark_in_flight(&mut self, key: &ConversationKey) {
        self.in_flight.insert(key.storage_key());
    }
}

impl Drop for ChatListStore {
    fn drop(&mut self) {
        if self.has_pending_work() {
            tracing::debug!("[ChatListStore] Running deferred work before shutdown");
            self.run_idle_tasks();
        }
    }
}
