//! Trimming and eviction thresholds
//!
//! Updates arrive as partial patches; unknown keys are ignored and the
//! soft/hard per-conversation ceilings are re-validated after every merge.

use serde::{Deserialize, Serialize};

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatListConfig {
    /// Count ceiling per conversation
    pub max_messages: usize,
    /// Per-conversation size that triggers a relaxed trim
    pub soft_chat_bytes: usize,
    /// Per-conversation size that triggers an unconditional trim
    pub hard_chat_bytes: usize,
    /// Fraction of the soft limit a soft trim aims for
    pub low_water_ratio: f64,
    /// Aggregate store budget used by the proactive eviction check
    pub global_quota_bytes: usize,
    pub global_soft_ratio: f64,
    pub global_hard_ratio: f64,
    /// Headroom requested on top of the incoming write when evicting
    pub target_free_after_evict: usize,
    /// Skip the soft trim when sampled entries are mostly external references
    pub relax_soft_trim: bool,
    pub reference_sample_size: usize,
    pub reference_skip_ratio: f64,
    /// Extra key prefixes purged once by the legacy sweep
    pub legacy_prefixes: Vec<String>,
}

impl Default for ChatListConfig {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            soft_chat_bytes: MIB,
            hard_chat_bytes: 2 * MIB,
            low_water_ratio: 0.7,
            global_quota_bytes: 5 * MIB,
            global_soft_ratio: 0.8,
            global_hard_ratio: 0.95,
            target_free_after_evict: 512 * KIB,
            relax_soft_trim: true,
            reference_sample_size: 20,
            reference_skip_ratio: 0.8,
            legacy_prefixes: Vec::new(),
        }
    }
}

/// Partial update for [`ChatListConfig`].
///
/// Accepts both snake_case field names and the upper-case threshold names
/// used by hosts (`MAX_MESSAGES`, `SOFT_CHAT_BYTES`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatListConfigPatch {
    #[serde(alias = "MAX_MESSAGES")]
    pub max_messages: Option<usize>,
    #[serde(alias = "SOFT_CHAT_BYTES")]
    pub soft_chat_bytes: Option<usize>,
    #[serde(alias = "HARD_CHAT_BYTES")]
    pub hard_chat_bytes: Option<usize>,
    #[serde(alias = "LOW_WATER_RATIO")]
    pub low_water_ratio: Option<f64>,
    #[serde(alias = "GLOBAL_QUOTA_BYTES")]
    pub global_quota_bytes: Option<usize>,
    #[serde(alias = "GLOBAL_SOFT_RATIO")]
    pub global_soft_ratio: Option<f64>,
    #[serde(alias = "GLOBAL_HARD_RATIO")]
    pub global_hard_ratio: Option<f64>,
    #[serde(alias = "TARGET_FREE_AFTER_EVICT")]
    pub target_free_after_evict: Option<usize>,
    pub relax_soft_trim: Option<bool>,
    pub reference_sample_size: Option<usize>,
    pub reference_skip_ratio: Option<f64>,
    pub legacy_prefixes: Option<Vec<String>>,
}

impl ChatListConfigPatch {
    /// Build a patch from loosely-typed JSON. Unrecognized keys are dropped,
    /// and so is anything that isn't an object.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(patch) => patch,
            Err(e) => {
                tracing::warn!("[ChatListConfig] Ignoring malformed config patch: {}", e);
                Self::default()
            }
        }
    }
}

impl ChatListConfig {
    /// Merge a partial update, then restore `soft_chat_bytes <= hard_chat_bytes`.
    pub fn apply(&mut self, patch: ChatListConfigPatch) {
        if let Some(v) = patch.max_messages {
            self.max_messages = v;
        }
        if let Some(v) = patch.soft_chat_bytes {
            self.soft_chat_bytes = v;
        }
        if let Some(v) = patch.hard_chat_bytes {
            self.hard_chat_bytes = v;
        }
        if let Some(v) = patch.low_water_ratio {
            self.low_water_ratio = v;
        }
        if let Some(v) = patch.global_quota_bytes {
            self.global_quota_bytes = v;
        }
        if let Some(v) = patch.global_soft_ratio {
            self.global_soft_ratio = v;
        }
        if let Some(v) = patch.global_hard_ratio {
            self.global_hard_ratio = v;
        }
        if let Some(v) = patch.target_free_after_evict {
            self.target_free_after_evict = v;
        }
        if let Some(v) = patch.relax_soft_trim {
            self.relax_soft_trim = v;
        }
        if let Some(v) = patch.reference_sample_size {
            self.reference_sample_size = v;
        }
        if let Some(v) = patch.reference_skip_ratio {
            self.reference_skip_ratio = v;
        }
        if let Some(v) = patch.legacy_prefixes {
            self.legacy_prefixes = v;
        }
        self.validate();
    }

    /// Best-effort clamping; never fails.
    pub fn validate(&mut self) {
        if self.soft_chat_bytes > self.hard_chat_bytes {
            tracing::warn!(
                "[ChatListConfig] soft_chat_bytes {} exceeds hard_chat_bytes {}, clamping",
                self.soft_chat_bytes,
                self.hard_chat_bytes
            );
            self.soft_chat_bytes = self.hard_chat_bytes;
        }
        if !self.low_water_ratio.is_finite() || self.low_water_ratio <= 0.0 || self.low_water_ratio > 1.0 {
            self.low_water_ratio = Self::default().low_water_ratio;
        }
    }

    /// Byte target of a soft trim
    pub fn soft_target_bytes(&self) -> usize {
        (self.soft_chat_bytes as f64 * self.low_water_ratio) as usize
    }
}
