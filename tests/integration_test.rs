//! Integration tests for chatlist
//!
//! Exercise the engine through its public surface with in-memory fakes and
//! the on-disk backends.

use chatlist::core::codec;
use chatlist::storage::{FileSystemStore, InMemoryStore, KeyValueStore, SqliteStore};
use chatlist::{
    ChatKind, ChatListConfig, ChatListConfigPatch, ChatListHooks, ChatListStore, EngineConfig,
    MessageLog, QuotaEvent, StoreError, StoreResult,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

/// Fails the next `fail_next` conversation writes with a quota error
struct FlakyStore {
    inner: InMemoryStore,
    fail_next: AtomicUsize,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_next: AtomicUsize::new(0),
        }
    }

    fn fail_writes(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if !key.ends_with("__index__") {
            let remaining = self.fail_next.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_next.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    requested: value.len() * 2,
                    available: 0,
                });
            }
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys()
    }
}

/// Counts physical writes per key
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStore,
    writes: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    fn writes_for(&self, key: &str) -> usize {
        self.writes.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

impl KeyValueStore for CountingStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        *self.writes.lock().unwrap().entry(key.to_string()).or_insert(0) += 1;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys()
    }
}

fn messages(count: usize, body_len: usize) -> MessageLog {
    (0..count)
        .map(|i| json!({ "id": i, "text": "x".repeat(body_len) }))
        .collect()
}

fn engine_with(store: Arc<dyn KeyValueStore>, config: ChatListConfig) -> ChatListStore {
    ChatListStore::new(store, "chatlist", config)
}

#[test]
fn test_count_limit_keeps_most_recent_in_order() {
    let backing = Arc::new(InMemoryStore::new());
    let mut engine = engine_with(
        backing.clone(),
        ChatListConfig {
            max_messages: 10,
            ..Default::default()
        },
    );
    let key = engine.key("127.0.0.1", 17117, ChatKind::Public, "general");

    let outcome = engine.save_chat_list(&key, messages(25, 4));

    assert!(outcome.changed);
    assert!(outcome.meta.trimmed_by_count);
    assert_eq!(outcome.data.len(), 10);
    let ids: Vec<u64> = outcome.data.iter().map(|m| m["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, (15..25).collect::<Vec<u64>>());

    let stored = engine.get_chat_list(&key).unwrap();
    assert_eq!(stored, outcome.data);
}

#[test]
fn test_hard_limit_bounds_stored_size() {
    let backing = Arc::new(InMemoryStore::new());
    let mut engine = engine_with(
        backing.clone(),
        ChatListConfig {
            soft_chat_bytes: 3_000,
            hard_chat_bytes: 4_000,
            relax_soft_trim: false,
            ..Default::default()
        },
    );
    let key = engine.key("127.0.0.1", 17117, ChatKind::Public, "big");

    let log = messages(100, 60);
    assert!(codec::size(&log) > 4_000);

    let outcome = engine.save_chat_list(&key, log);

    assert!(outcome.meta.success);
    assert!(outcome.meta.final_bytes <= 4_000);
    assert_eq!(codec::size(&outcome.data), outcome.meta.final_bytes);
    let raw = backing.get(&key.storage_key()).unwrap().unwrap();
    assert!(codec::text_size(&raw) <= 4_000);
}

#[test]
fn test_identical_save_is_deduplicated() {
    let backing = Arc::new(CountingStore::default());
    let mut engine = engine_with(backing.clone(), ChatListConfig::default());
    let key = engine.key("127.0.0.1", 17117, ChatKind::Private, "dm");
    let log = messages(3, 10);

    let first = engine.save_chat_list(&key, log.clone());
    let second = engine.save_chat_list(&key, log);

    assert!(first.meta.written);
    assert!(!second.changed);
    assert!(second.meta.deduplicated);
    assert!(!second.meta.written);
    assert!(second.meta.success);
    assert_eq!(backing.writes_for(&key.storage_key()), 1);
}

#[test]
fn test_index_freshness_is_monotonic_across_restarts() {
    let backing: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let key;
    let first_stamp;
    {
        let mut engine = engine_with(backing.clone(), ChatListConfig::default());
        key = engine.key("127.0.0.1", 17117, ChatKind::Public, "general");
        first_stamp = engine
            .save_chat_list(&key, messages(1, 4))
            .meta
            .updated_at
            .unwrap();
        let second_stamp = engine
            .save_chat_list(&key, messages(2, 4))
            .meta
            .updated_at
            .unwrap();
        assert!(second_stamp > first_stamp);
        // dropped here, which flushes the index
    }

    let mut engine = engine_with(backing, ChatListConfig::default());
    let previous = engine.index_entries()[0].updated_at;
    assert!(previous > first_stamp);

    let third = engine.save_chat_list(&key, messages(3, 4));
    assert!(third.meta.updated_at.unwrap() >= previous);
}

#[test]
fn test_eviction_removes_oldest_first() {
    let backing = Arc::new(InMemoryStore::new());
    let mut engine = engine_with(backing.clone(), ChatListConfig::default());

    let keys: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|id| engine.key("127.0.0.1", 17117, ChatKind::Public, id))
        .collect();
    for key in &keys {
        assert!(engine.save_chat_list(key, messages(5, 20)).meta.success);
    }

    let oldest_size = engine
        .index_entries()
        .iter()
        .find(|e| e.key == keys[0].storage_key())
        .map(|e| e.size)
        .unwrap();

    // One byte more than the oldest conversation forces a second eviction
    let stats = engine.evict(oldest_size + 1, false);

    assert_eq!(
        stats.evicted_keys,
        vec![keys[0].storage_key(), keys[1].storage_key()]
    );
    assert!(stats.satisfied());
    assert!(engine.get_chat_list(&keys[0]).is_none());
    assert!(engine.get_chat_list(&keys[1]).is_none());
    assert!(engine.get_chat_list(&keys[2]).is_some());
    assert!(engine.get_chat_list(&keys[3]).is_some());

    let remaining: Vec<String> = engine.index_entries().into_iter().map(|e| e.key).collect();
    assert_eq!(remaining, vec![keys[3].storage_key(), keys[2].storage_key()]);
}

#[test]
fn test_eviction_stops_when_catalog_exhausted() {
    let backing = Arc::new(InMemoryStore::new());
    let mut engine = engine_with(backing, ChatListConfig::default());
    let key = engine.key("127.0.0.1", 17117, ChatKind::Public, "only");
    engine.save_chat_list(&key, messages(2, 2));

    let stats = engine.evict(10_000_000, false);

    assert_eq!(stats.evicted_keys, vec![key.storage_key()]);
    assert!(!stats.satisfied());
    assert!(engine.index_entries().is_empty());
}

#[test]
fn test_round_trip_preserves_content() {
    let log: MessageLog = vec![
        json!({"user": "ünïcødé", "text": "line\nbreak", "n": 1.5}),
        json!(["nested", {"deep": null}]),
        json!("plain 😀"),
    ];
    let raw = codec::serialize(&log);
    assert_eq!(codec::deserialize(&raw), Some(log));
}

#[test]
fn test_quota_failure_evicts_and_retries_once() {
    let backing = Arc::new(FlakyStore::new());
    let mut engine = engine_with(backing.clone(), ChatListConfig::default());

    let old = engine.key("127.0.0.1", 17117, ChatKind::Public, "old");
    let new = engine.key("127.0.0.1", 17117, ChatKind::Public, "new");
    assert!(engine.save_chat_list(&old, messages(3, 10)).meta.success);

    let events: Arc<Mutex<Vec<QuotaEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.register_hooks(ChatListHooks::new().on_quota_exceeded(move |event| {
        sink.lock().unwrap().push(event.clone());
    }));

    backing.fail_writes(1);
    let outcome = engine.save_chat_list(&new, messages(3, 10));

    assert!(outcome.meta.quota_exceeded);
    assert!(!outcome.meta.quota_final_failure);
    assert!(outcome.meta.success);
    assert_eq!(outcome.meta.eviction_attempts, 1);
    let retry = outcome.meta.retry_eviction.as_ref().unwrap();
    assert_eq!(retry.evicted_keys, vec![old.storage_key()]);

    assert!(engine.get_chat_list(&new).is_some());
    assert!(engine.get_chat_list(&old).is_none());

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].final_failure);
}

#[test]
fn test_quota_final_failure_reports_without_panicking() {
    let backing = Arc::new(InMemoryStore::with_quota(200));
    let mut engine = engine_with(backing, ChatListConfig::default());
    let key = engine.key("127.0.0.1", 17117, ChatKind::Public, "huge");

    let finals = Arc::new(AtomicUsize::new(0));
    let counter = finals.clone();
    engine.register_hooks(ChatListHooks::new().on_quota_exceeded(move |event| {
        if event.final_failure {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let outcome = engine.save_chat_list(&key, messages(4, 100));

    assert!(outcome.meta.quota_exceeded);
    assert!(outcome.meta.quota_final_failure);
    assert!(!outcome.meta.success);
    assert!(outcome.meta.error.is_some());
    assert_eq!(finals.load(Ordering::SeqCst), 1);
    assert!(engine.get_chat_list(&key).is_none());
    assert!(engine.index_entries().is_empty());
}

#[test]
fn test_config_self_corrects_soft_above_hard() {
    let mut engine = engine_with(Arc::new(InMemoryStore::new()), ChatListConfig::default());

    engine.configure(ChatListConfigPatch::from_json(&json!({
        "SOFT_CHAT_BYTES": 9_000,
        "HARD_CHAT_BYTES": 4_000,
        "NOT_A_SETTING": true
    })));

    assert_eq!(engine.config().hard_chat_bytes, 4_000);
    assert!(engine.config().soft_chat_bytes <= engine.config().hard_chat_bytes);
}

#[test]
fn test_proactive_eviction_spares_the_key_being_saved() {
    let backing = Arc::new(InMemoryStore::new());
    let mut engine = engine_with(
        backing,
        ChatListConfig {
            global_quota_bytes: 2_000,
            target_free_after_evict: 0,
            ..Default::default()
        },
    );
    let old = engine.key("127.0.0.1", 17117, ChatKind::Public, "old");
    let current = engine.key("127.0.0.1", 17117, ChatKind::Public, "current");

    engine.save_chat_list(&old, messages(4, 100));
    engine.save_chat_list(&current, messages(1, 10));
    let outcome = engine.save_chat_list(&current, messages(4, 100));

    let proactive = outcome.meta.eviction.as_ref().unwrap();
    assert!(proactive.proactive);
    assert_eq!(proactive.evicted_keys, vec![old.storage_key()]);
    assert!(outcome.meta.success);
    assert!(engine.get_chat_list(&current).is_some());
}

#[test]
fn test_legacy_keys_purged_on_first_save() {
    let backing = Arc::new(InMemoryStore::new());
    backing.set("chatlist:stale-layout", "[]").unwrap();
    backing.set("old_chat_general", "[]").unwrap();
    backing.set("unrelated", "keep").unwrap();

    let mut engine = engine_with(
        backing.clone(),
        ChatListConfig {
            legacy_prefixes: vec!["old_chat_".to_string()],
            ..Default::default()
        },
    );
    let key = engine.key("127.0.0.1", 17117, ChatKind::Public, "general");
    engine.save_chat_list(&key, messages(1, 1));

    assert!(backing.get("chatlist:stale-layout").unwrap().is_none());
    assert!(backing.get("old_chat_general").unwrap().is_none());
    assert_eq!(backing.get("unrelated").unwrap().as_deref(), Some("keep"));
}

#[test]
fn test_restart_keeps_ipv6_host_conversations() {
    let backing: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let log = messages(2, 4);
    let ipv6;
    {
        let mut first = engine_with(backing.clone(), ChatListConfig::default());
        ipv6 = first.key("::1", 17117, ChatKind::Public, "general");
        assert!(first.save_chat_list(&ipv6, log.clone()).meta.success);
    }

    let mut second = engine_with(backing, ChatListConfig::default());
    let other = second.key("127.0.0.1", 17117, ChatKind::Public, "other");
    assert!(second.save_chat_list(&other, messages(1, 4)).meta.success);

    assert_eq!(second.get_chat_list(&ipv6), Some(log));
    assert_eq!(second.index_entries().len(), 2);
}

#[test]
fn test_restart_keeps_conversations_in_colon_namespace() {
    let backing: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let log = messages(2, 4);
    let general;
    {
        let mut first = ChatListStore::new(backing.clone(), "app:chat", ChatListConfig::default());
        general = first.key("127.0.0.1", 17117, ChatKind::Private, "general");
        assert!(first.save_chat_list(&general, log.clone()).meta.success);
    }

    let mut second = ChatListStore::new(backing.clone(), "app:chat", ChatListConfig::default());
    let other = second.key("127.0.0.1", 17117, ChatKind::Public, "other");
    assert!(second.save_chat_list(&other, messages(1, 4)).meta.success);

    assert_eq!(second.get_chat_list(&general), Some(log));
    let mut keys: Vec<String> = second.index_entries().into_iter().map(|e| e.key).collect();
    keys.sort();
    assert_eq!(keys, vec![general.storage_key(), other.storage_key()]);
}

#[test]
fn test_filesystem_backend_survives_restart() {
    let dir = tempdir().unwrap();
    let chat: Value = json!({"text": "persisted"});

    {
        let store = FileSystemStore::new(dir.path().to_path_buf()).unwrap();
        let mut engine = engine_with(Arc::new(store), ChatListConfig::default());
        let key = engine.key("10.0.0.1", 8080, ChatKind::Private, "room:with:colons");
        assert!(engine.save_chat_list(&key, vec![chat.clone()]).meta.success);
    }

    let store = FileSystemStore::new(dir.path().to_path_buf()).unwrap();
    let mut engine = engine_with(Arc::new(store), ChatListConfig::default());
    let key = engine.key("10.0.0.1", 8080, ChatKind::Private, "room:with:colons");

    assert_eq!(engine.get_chat_list(&key), Some(vec![chat]));
    assert_eq!(engine.index_entries().len(), 1);
}

#[test]
fn test_sqlite_backend_round_trip_and_delete() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("chats.db")).unwrap();
    let mut engine = engine_with(Arc::new(store), ChatListConfig::default());
    let key = engine.key("127.0.0.1", 17117, ChatKind::Public, "general");

    engine.save_chat_list(&key, messages(3, 5));
    assert_eq!(engine.get_chat_list(&key).map(|l| l.len()), Some(3));

    engine.delete_chat_list(&key);
    assert!(engine.get_chat_list(&key).is_none());
    assert!(engine.index_entries().is_empty());
}

#[test]
fn test_queued_save_is_visible_before_flush() {
    let backing = Arc::new(InMemoryStore::new());
    let mut engine = engine_with(
        backing.clone(),
        ChatListConfig {
            max_messages: 2,
            ..Default::default()
        },
    );
    let key = engine.key("127.0.0.1", 17117, ChatKind::Public, "general");

    let trimmed = engine.queue_save(&key, messages(5, 1));
    assert_eq!(trimmed.len(), 2);
    assert!(backing.get(&key.storage_key()).unwrap().is_none());
    assert_eq!(engine.get_chat_list(&key), Some(trimmed));

    let results = engine.run_idle_tasks();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert!(backing.get(&key.storage_key()).unwrap().is_some());
    assert!(backing.get("chatlist:__index__").unwrap().is_some());
}

// The global facade can only be initialized once per process
#[tokio::test]
async fn test_global_api_facade() {
    let backing = Arc::new(InMemoryStore::new());
    let engine = ChatListStore::new(backing.clone(), "chatlist", ChatListConfig::default());
    chatlist::init_with_engine(engine, &EngineConfig::default())
        .await
        .unwrap();

    let saved = chatlist::save_chat_list("127.0.0.1", 17117, ChatKind::Public, "general", messages(2, 3))
        .await
        .unwrap();
    assert!(saved.meta.success);

    let chat = chatlist::Chat::public("127.0.0.1", 17117, "general");
    let appended = chat.append(json!({"text": "third"})).await.unwrap();
    assert_eq!(appended.data.len(), 3);

    let config = chatlist::set_chat_list_config(ChatListConfigPatch {
        max_messages: Some(2),
        soft_chat_bytes: Some(50_000),
        hard_chat_bytes: Some(10_000),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(config.soft_chat_bytes, 10_000);

    let trimmed = chatlist::runtime_trim_array(messages(5, 1)).await.unwrap();
    assert_eq!(trimmed.len(), 2);

    let report = chatlist::usage_report().await.unwrap();
    assert_eq!(report.conversations, 1);

    chatlist::delete_chat_list("127.0.0.1", 17117, ChatKind::Public, "general")
        .await
        .unwrap();
    assert!(chat.load().await.unwrap().is_none());

    assert!(chatlist::init_with_engine(
        ChatListStore::new(Arc::new(InMemoryStore::new()), "other", ChatListConfig::default()),
        &EngineConfig::default(),
    )
    .await
    .is_err());

    chatlist::shutdown().await.unwrap();
}
