//! Simple async API facade
//!
//! Free functions over the global store actor. Conversations are addressed by
//! host, port, kind and chat id; the namespace comes from the settings the
//! system was initialized with.

use crate::config::{ChatListConfig, ChatListConfigPatch};
use crate::core::{
    ChatKind, ChatListHooks, ConversationKey, EvictionStats, IndexEntry, MessageLog, SaveOutcome,
    SaveResult, UsageReport,
};
use crate::System;
use anyhow::Result;
use serde_json::Value;

fn conversation_key(system: &System, host: &str, port: u16, kind: ChatKind, chat_id: &str) -> ConversationKey {
    ConversationKey::new(&system.namespace, host, port, kind, chat_id)
}

/// Load a conversation's message log, or `None` if nothing is stored
///
/// # Example
/// ```no_run
/// use chatlist::{init, get_chat_list, ChatKind};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     init().await?;
///     let log = get_chat_list("127.0.0.1", 17117, ChatKind::Public, "general").await?;
///     println!("{} messages", log.map(|l| l.len()).unwrap_or(0));
///     Ok(())
/// }
/// ```
pub async fn get_chat_list(host: &str, port: u16, kind: ChatKind, chat_id: &str) -> Result<Option<MessageLog>> {
    let system = System::global()?;
    let key = conversation_key(system, host, port, kind, chat_id);
    system.store.get_chat_list(key).await
}

/// Trim and persist a message log. The returned outcome carries the log as
/// stored, whether trimming changed it, and the full save result.
pub async fn save_chat_list(
    host: &str,
    port: u16,
    kind: ChatKind,
    chat_id: &str,
    log: MessageLog,
) -> Result<SaveOutcome> {
    let system = System::global()?;
    let key = conversation_key(system, host, port, kind, chat_id);
    system.store.save_chat_list(key, log).await
}

/// Trim a message log now and persist it when the store goes idle
pub async fn queue_save(host: &str, port: u16, kind: ChatKind, chat_id: &str, log: MessageLog) -> Result<MessageLog> {
    let system = System::global()?;
    let key = conversation_key(system, host, port, kind, chat_id);
    system.store.queue_save(key, log).await
}

pub async fn delete_chat_list(host: &str, port: u16, kind: ChatKind, chat_id: &str) -> Result<()> {
    let system = System::global()?;
    let key = conversation_key(system, host, port, kind, chat_id);
    system.store.delete_chat_list(key).await
}

/// Apply count and size limits to an in-memory log without touching storage
pub async fn runtime_trim_array(log: MessageLog) -> Result<MessageLog> {
    let system = System::global()?;
    system.store.runtime_trim(log).await
}

/// Merge a partial configuration into the active one and return the result
pub async fn set_chat_list_config(patch: ChatListConfigPatch) -> Result<ChatListConfig> {
    let system = System::global()?;
    system.store.configure(patch).await
}

/// Like [`set_chat_list_config`], for loosely shaped JSON from a host.
/// Unknown or mistyped fields are ignored.
pub async fn set_chat_list_config_json(value: &Value) -> Result<ChatListConfig> {
    set_chat_list_config(ChatListConfigPatch::from_json(value)).await
}

pub async fn register_hooks(hooks: ChatListHooks) -> Result<()> {
    let system = System::global()?;
    system.store.register_hooks(hooks).await
}

/// Evict oldest conversations until `required_bytes` are freed
pub async fn evict_oldest(required_bytes: usize) -> Result<EvictionStats> {
    let system = System::global()?;
    system.store.evict(required_bytes, false).await
}

pub async fn usage_report() -> Result<UsageReport> {
    let system = System::global()?;
    system.store.usage().await
}

/// Index entries, most recently updated first
pub async fn list_chats() -> Result<Vec<IndexEntry>> {
    let system = System::global()?;
    system.store.index_entries().await
}

pub async fn last_save_result() -> Result<Option<SaveResult>> {
    let system = System::global()?;
    system.store.last_result().await
}

/// Persist queued saves and the index immediately
pub async fn flush() -> Result<Vec<SaveResult>> {
    let system = System::global()?;
    system.store.flush().await
}

/// Address of a single conversation, for callers that touch the same one repeatedly
#[derive(Debug, Clone)]
pub struct Chat {
    host: String,
    port: u16,
    kind: ChatKind,
    chat_id: String,
}

impl Chat {
    pub fn new(host: impl Into<String>, port: u16, kind: ChatKind, chat_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            kind,
            chat_id: chat_id.into(),
        }
    }

    pub fn public(host: impl Into<String>, port: u16, chat_id: impl Into<String>) -> Self {
        Self::new(host, port, ChatKind::Public, chat_id)
    }

    pub fn private(host: impl Into<String>, port: u16, chat_id: impl Into<String>) -> Self {
        Self::new(host, port, ChatKind::Private, chat_id)
    }

    pub async fn load(&self) -> Result<Option<MessageLog>> {
        get_chat_list(&self.host, self.port, self.kind, &self.chat_id).await
    }

    pub async fn save(&self, log: MessageLog) -> Result<SaveOutcome> {
        save_chat_list(&self.host, self.port, self.kind, &self.chat_id, log).await
    }

    pub async fn queue(&self, log: MessageLog) -> Result<MessageLog> {
        queue_save(&self.host, self.port, self.kind, &self.chat_id, log).await
    }

    /// Load, append one message, save
    pub async fn append(&self, message: Value) -> Result<SaveOutcome> {
        let mut log = self.load().await?.unwrap_or_default();
        log.push(message);
        self.save(log).await
    }

    pub async fn delete(&self) -> Result<()> {
        delete_chat_list(&self.host, self.port, self.kind, &self.chat_id).await
    }
}
