use crate::config::{ChatListConfig, ChatListConfigPatch};
use crate::core::{
    ChatListHooks, ConversationKey, EvictionStats, IndexEntry, MessageLog, SaveOutcome, SaveResult,
    UsageReport,
};
use tokio::sync::oneshot;

/// Requests served by the store actor. Every variant carries the sender its
/// reply goes back on.
#[derive(Debug)]
pub enum StoreMessage {
    Get {
        key: ConversationKey,
        response: oneshot::Sender<Option<MessageLog>>,
    },
    Save {
        key: ConversationKey,
        log: MessageLog,
        response: oneshot::Sender<SaveOutcome>,
    },
    QueueSave {
        key: ConversationKey,
        log: MessageLog,
        response: oneshot::Sender<MessageLog>,
    },
    Delete {
        key: ConversationKey,
        response: oneshot::Sender<()>,
    },
    RuntimeTrim {
        log: MessageLog,
        response: oneshot::Sender<MessageLog>,
    },
    Configure {
        patch: ChatListConfigPatch,
        response: oneshot::Sender<ChatListConfig>,
    },
    RegisterHooks {
        hooks: ChatListHooks,
        response: oneshot::Sender<()>,
    },
    Evict {
        required_bytes: usize,
        proactive: bool,
        response: oneshot::Sender<EvictionStats>,
    },
    Usage(oneshot::Sender<UsageReport>),
    IndexEntries(oneshot::Sender<Vec<IndexEntry>>),
    LastResult(oneshot::Sender<Option<SaveResult>>),
    /// Run deferred work now instead of waiting for idle
    Flush(oneshot::Sender<Vec<SaveResult>>),
    Shutdown(oneshot::Sender<()>),
}
