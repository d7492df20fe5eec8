//! Single-writer actor around the persistence engine
//!
//! One task owns the `ChatListStore`; every caller goes through the handle,
//! so requests for the same key are serialized without any locking. When the
//! channel stays quiet for `flush_idle_ms`, or deferred work has waited past
//! `max_flush_delay_ms`, queued saves and the index flush are drained.

use crate::actors::messages::StoreMessage;
use crate::config::{ChatListConfig, ChatListConfigPatch, EngineConfig, Settings};
use crate::core::{
    ChatListHooks, ChatListStore, ConversationKey, EvictionStats, IndexEntry, MessageLog,
    SaveOutcome, SaveResult, UsageReport,
};
use anyhow::Result;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

#[derive(Clone)]
pub struct ChatStoreHandle {
    sender: Sender<StoreMessage>,
}

impl ChatStoreHandle {
    pub fn new(engine: ChatListStore, config: &EngineConfig) -> Self {
        let (sender, receiver) = channel(config.channel_buffer_size.max(1));
        tokio::spawn(store_actor(receiver, engine, config.clone()));
        Self { sender }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let engine = ChatListStore::from_settings(settings)?;
        Ok(Self::new(engine, &settings.engine))
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StoreMessage) -> Result<T> {
        let (response, rx) = oneshot::channel();
        self.sender
            .send(build(response))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send message to chat store actor: {}", e))?;
        rx.await
            .map_err(|e| anyhow::anyhow!("Chat store actor dropped the request: {}", e))
    }

    pub async fn get_chat_list(&self, key: ConversationKey) -> Result<Option<MessageLog>> {
        self.request(|response| StoreMessage::Get { key, response }).await
    }

    pub async fn save_chat_list(&self, key: ConversationKey, log: MessageLog) -> Result<SaveOutcome> {
        self.request(|response| StoreMessage::Save { key, log, response })
            .await
    }

    pub async fn queue_save(&self, key: ConversationKey, log: MessageLog) -> Result<MessageLog> {
        self.request(|response| StoreMessage::QueueSave { key, log, response })
            .await
    }

    pub async fn delete_chat_list(&self, key: ConversationKey) -> Result<()> {
        self.request(|response| StoreMessage::Delete { key, response })
            .await
    }

    pub async fn runtime_trim(&self, log: MessageLog) -> Result<MessageLog> {
        self.request(|response| StoreMessage::RuntimeTrim { log, response })
            .await
    }

    pub async fn configure(&self, patch: ChatListConfigPatch) -> Result<ChatListConfig> {
        self.request(|response| StoreMessage::Configure { patch, response })
            .await
    }

    pub async fn register_hooks(&self, hooks: ChatListHooks) -> Result<()> {
        self.request(|response| StoreMessage::RegisterHooks { hooks, response })
            .await
    }

    pub async fn evict(&self, required_bytes: usize, proactive: bool) -> Result<EvictionStats> {
        self.request(|response| StoreMessage::Evict {
            required_bytes,
            proactive,
            response,
        })
        .await
    }

    pub async fn usage(&self) -> Result<UsageReport> {
        self.request(StoreMessage::Usage).await
    }

    pub async fn index_entries(&self) -> Result<Vec<IndexEntry>> {
        self.request(StoreMessage::IndexEntries).await
    }

    pub async fn last_result(&self) -> Result<Option<SaveResult>> {
        self.request(StoreMessage::LastResult).await
    }

    pub async fn flush(&self) -> Result<Vec<SaveResult>> {
        self.request(StoreMessage::Flush).await
    }

    /// Drain deferred work and stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.request(StoreMessage::Shutdown).await
    }
}

async fn store_actor(mut receiver: Receiver<StoreMessage>, mut engine: ChatListStore, config: EngineConfig) {
    let idle = Duration::from_millis(config.flush_idle_ms.max(1));
    let max_delay = Duration::from_millis(config.max_flush_delay_ms);

    tracing::info!("Chat store actor started (namespace '{}')", engine.namespace());

    loop {
        match timeout(idle, receiver.recv()).await {
            Ok(Some(StoreMessage::Shutdown(done))) => {
                let results = engine.run_idle_tasks();
                tracing::info!(
                    "Chat store actor shutting down after {} deferred saves",
                    results.len()
                );
                let _ = done.send(());
                break;
            }
            Ok(Some(message)) => {
                handle_store_message(message, &mut engine);
                if engine.is_overdue(max_delay) {
                    tracing::debug!("Deferred work overdue, draining under load");
                    engine.run_idle_tasks();
                }
            }
            Ok(None) => {
                tracing::info!("Chat store actor channel closed, shutting down");
                break;
            }
            Err(_) => {
                if engine.has_pending_work() {
                    engine.run_idle_tasks();
                }
            }
        }
    }
}

fn handle_store_message(message: StoreMessage, engine: &mut ChatListStore) {
    match message {
        StoreMessage::Get { key, response } => {
            let _ = response.send(engine.get_chat_list(&key));
        }
        StoreMessage::Save { key, log, response } => {
            let _ = response.send(engine.save_chat_list(&key, log));
        }
        StoreMessage::QueueSave { key, log, response } => {
            let _ = response.send(engine.queue_save(&key, log));
        }
        StoreMessage::Delete { key, response } => {
            engine.delete_chat_list(&key);
            let _ = response.send(());
        }
        StoreMessage::RuntimeTrim { log, response } => {
            let _ = response.send(engine.runtime_trim(log));
        }
        StoreMessage::Configure { patch, response } => {
            engine.configure(patch);
            let _ = response.send(engine.config().clone());
        }
        StoreMessage::RegisterHooks { hooks, response } => {
            engine.register_hooks(hooks);
            let _ = response.send(());
        }
        StoreMessage::Evict {
            required_bytes,
            proactive,
            response,
        } => {
            let _ = response.send(engine.evict(required_bytes, proactive));
        }
        StoreMessage::Usage(response) => {
            let _ = response.send(engine.usage_report());
        }
        StoreMessage::IndexEntries(response) => {
            let _ = response.send(engine.index_entries());
        }
        StoreMessage::LastResult(response) => {
            let _ = response.send(engine.last_result().cloned());
        }
        StoreMessage::Flush(response) => {
            let _ = response.send(engine.run_idle_tasks());
        }
        StoreMessage::Shutdown(done) => {
            // Handled by the loop; answer anyway if it ever lands here
            let _ = done.send(());
        }
    }
}
