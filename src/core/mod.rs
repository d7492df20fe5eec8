//! Persistence engine core
//!
//! Leaf modules (codec, trimmer, index, usage, evictor) are independent of
//! each other's state; `engine` composes them into the write pipeline.

pub mod codec;
pub mod engine;
pub mod evictor;
pub mod hooks;
pub mod index;
pub mod key;
pub mod scheduler;
pub mod trimmer;
pub mod usage;

pub use codec::MessageLog;
pub use engine::{ChatListStore, SaveOutcome, SaveResult, UsageReport};
pub use evictor::EvictionStats;
pub use hooks::{ChatListHooks, QuotaEvent, TrimEvent, TrimStage};
pub use index::IndexEntry;
pub use key::{ChatKind, ConversationKey};
