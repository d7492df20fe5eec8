//! Observability hooks
//!
//! Hosts register plain callbacks; each one is optional and registering a
//! new set only replaces the callbacks it provides.

use super::evictor::EvictionStats;
use super::engine::SaveResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimStage {
    Count,
    Soft,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimEvent {
    pub key: String,
    pub stage: TrimStage,
    pub before_count: usize,
    pub after_count: usize,
    pub before_bytes: usize,
    pub after_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaEvent {
    pub key: String,
    pub attempted_bytes: usize,
    /// The retry failed too; nothing was written
    pub final_failure: bool,
    pub error: String,
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ChatListHooks {
    on_trim: Option<Callback<TrimEvent>>,
    on_evict: Option<Callback<EvictionStats>>,
    on_quota_exceeded: Option<Callback<QuotaEvent>>,
    on_save: Option<Callback<SaveResult>>,
}

impl ChatListHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_trim<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TrimEvent) + Send + Sync + 'static,
    {
        self.on_trim = Some(Arc::new(callback));
        self
    }

    pub fn on_evict<F>(mut self, callback: F) -> Self
    where
        F: Fn(&EvictionStats) + Send + Sync + 'static,
    {
        self.on_evict = Some(Arc::new(callback));
        self
    }

    pub fn on_quota_exceeded<F>(mut self, callback: F) -> Self
    where
        F: Fn(&QuotaEvent) + Send + Sync + 'static,
    {
        self.on_quota_exceeded = Some(Arc::new(callback));
        self
    }

    pub fn on_save<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SaveResult) + Send + Sync + 'static,
    {
        self.on_save = Some(Arc::new(callback));
        self
    }

    /// Overlay `other` on top of `self`
    pub fn merge(&mut self, other: ChatListHooks) {
        if other.on_trim.is_some() {
            self.on_trim = other.on_trim;
        }
        if other.on_evict.is_some() {
            self.on_evict = other.on_evict;
        }
        if other.on_quota_exceeded.is_some() {
            self.on_quota_exceeded = other.on_quota_exceeded;
        }
        if other.on_save.is_some() {
            self.on_save = other.on_save;
        }
    }

    pub(crate) fn trim(&self, event: &TrimEvent) {
        if let Some(callback) = &self.on_trim {
            callback(event);
        }
    }

    pub(crate) fn evict(&self, stats: &EvictionStats) {
        if let Some(callback) = &self.on_evict {
            callback(stats);
        }
    }

    pub(crate) fn quota_exceeded(&self, event: &QuotaEvent) {
        if let Some(callback) = &self.on_quota_exceeded {
            callback(event);
        }
    }

    pub(crate) fn save(&self, result: &SaveResult) {
        if let Some(callback) = &self.on_save {
            callback(result);
        }
    }
}

impl fmt::Debug for ChatListHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatListHooks")
            .field("on_trim", &self.on_trim.is_some())
            .field("on_evict", &self.on_evict.is_some())
            .field("on_quota_exceeded", &self.on_quota_exceeded.is_some())
            .field("on_save", &self.on_save.is_some())
            .finish()
    }
}
