//! Chatlist - bounded chat history persistence
//!
//! Stores per-conversation message logs in a quota-limited key-value store.
//! Logs are trimmed by count and size before every write, a metadata index
//! tracks recency and size of each conversation, and the oldest conversations
//! are evicted when the store runs out of room.

pub mod actors;
mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;

pub mod api;
pub mod cli;

pub use api::*;
pub use crate::config::{ChatListConfig, ChatListConfigPatch, EngineConfig, LoggingConfig, Settings, StorageConfig};
pub use crate::core::{
    ChatKind, ChatListHooks, ChatListStore, ConversationKey, EvictionStats, IndexEntry, MessageLog,
    QuotaEvent, SaveOutcome, SaveResult, TrimEvent, TrimStage, UsageReport,
};
pub use error::{StoreError, StoreResult};

use actors::ChatStoreHandle;
use once_cell::sync::OnceCell;

static SYSTEM: OnceCell<System> = OnceCell::new();

pub struct System {
    store: ChatStoreHandle,
    namespace: String,
}

impl System {
    fn new(store: ChatStoreHandle, namespace: String) -> Self {
        Self { store, namespace }
    }

    fn global() -> anyhow::Result<&'static System> {
        SYSTEM
            .get()
            .ok_or_else(|| anyhow::anyhow!("System not initialized. Call init() first"))
    }
}

/// Initialize the global store from `config/` and `APP__` environment variables
/// Must be called before using any API functions
pub async fn init() -> anyhow::Result<()> {
    let settings = Settings::new()?;
    init_with(settings).await
}

/// Initialize the global store from explicit settings
pub async fn init_with(settings: Settings) -> anyhow::Result<()> {
    let engine = ChatListStore::from_settings(&settings)?;
    init_with_engine(engine, &settings.engine).await
}

/// Initialize the global store around an engine the caller already built,
/// e.g. one backed by a custom `KeyValueStore`
pub async fn init_with_engine(engine: ChatListStore, config: &EngineConfig) -> anyhow::Result<()> {
    let namespace = engine.namespace().to_string();
    if SYSTEM.get().is_some() {
        anyhow::bail!("System already initialized");
    }

    let system = System::new(ChatStoreHandle::new(engine, config), namespace);
    if let Err(system) = SYSTEM.set(system) {
        let _ = system.store.shutdown().await;
        anyhow::bail!("System already initialized");
    }

    tracing::info!("Chatlist system initialized");
    Ok(())
}

/// Drain deferred saves and stop the store actor
pub async fn shutdown() -> anyhow::Result<()> {
    if let Some(system) = SYSTEM.get() {
        system.store.shutdown().await?;
    }
    tracing::info!("Chatlist system shutdown complete");
    Ok(())
}
