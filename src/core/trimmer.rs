//! Log trimming
//!
//! Pure functions; the oldest entries are always the ones dropped and the
//! kept suffix preserves its order.

use super::codec::{self, MessageLog};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Lower bound on the ratio-based keep estimate
const MIN_ESTIMATED_KEEP: usize = 50;
/// Below this many entries the geometric pass stops
const MIN_LEN_FOR_THIRDS: usize = 20;
const MAX_THIRD_ROUNDS: usize = 8;
/// The linear pass never shrinks a log below this length
const LINEAR_FLOOR: usize = 20;
const LINEAR_STEP: usize = 10;

/// Entries larger than this are treated as inlined content
const REFERENCE_MAX_BYTES: usize = 2 * 1024;

static EXTERNAL_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?|file)://").expect("valid reference regex"));
static INLINE_PAYLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)data:[a-z0-9.+/-]*;base64,").expect("valid payload regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct Trimmed {
    pub data: MessageLog,
    pub trimmed: bool,
}

impl Trimmed {
    fn untouched(data: MessageLog) -> Self {
        Self {
            data,
            trimmed: false,
        }
    }
}

fn drop_oldest(data: &mut MessageLog, count: usize) {
    let count = count.min(data.len());
    data.drain(..count);
}

/// Keep at most the last `ceiling` entries
pub fn trim_by_count(mut log: MessageLog, ceiling: usize) -> Trimmed {
    if log.len() <= ceiling {
        return Trimmed::untouched(log);
    }
    let excess = log.len() - ceiling;
    drop_oldest(&mut log, excess);
    Trimmed {
        data: log,
        trimmed: true,
    }
}

/// Shrink `log` until its serialized size is at most `target_bytes`.
///
/// Heuristic and bounded: a ratio-based estimate first, then up to eight
/// rounds dropping the oldest third, then ten at a time. Logs of twenty
/// entries or fewer may be returned still over target.
pub fn trim_by_size(mut log: MessageLog, target_bytes: usize) -> Trimmed {
    let current = codec::size(&log);
    if current <= target_bytes {
        return Trimmed::untouched(log);
    }
    let original_len = log.len();

    let ratio = target_bytes as f64 / current as f64;
    let estimate = (original_len as f64 * ratio).floor() as usize;
    let keep = estimate
        .max(MIN_ESTIMATED_KEEP.min(original_len.saturating_sub(1)))
        .min(original_len);
    drop_oldest(&mut log, original_len - keep);
    let mut size = codec::size(&log);

    let mut rounds = 0;
    while size > target_bytes && log.len() >= MIN_LEN_FOR_THIRDS && rounds < MAX_THIRD_ROUNDS {
        let third = (log.len() / 3).max(1);
        drop_oldest(&mut log, third);
        size = codec::size(&log);
        rounds += 1;
    }

    while size > target_bytes && log.len() > LINEAR_FLOOR {
        drop_oldest(&mut log, LINEAR_STEP);
        size = codec::size(&log);
    }

    tracing::debug!(
        "[Trimmer] Size trim {} -> {} entries ({} -> {} bytes, target {})",
        original_len,
        log.len(),
        current,
        size,
        target_bytes
    );

    Trimmed {
        trimmed: log.len() < original_len,
        data: log,
    }
}

/// Like [`trim_by_size`] but guarantees the ceiling, dropping single entries
/// once the heuristic passes give up. May return an empty log.
pub fn trim_to_ceiling(log: MessageLog, ceiling_bytes: usize) -> Trimmed {
    let Trimmed { data: mut log, mut trimmed } = trim_by_size(log, ceiling_bytes);
    while !log.is_empty() && codec::size(&log) > ceiling_bytes {
        drop_oldest(&mut log, 1);
        trimmed = true;
    }
    Trimmed { data: log, trimmed }
}

fn is_reference_entry(entry: &Value) -> bool {
    let text = entry.to_string();
    codec::text_size(&text) < REFERENCE_MAX_BYTES
        && EXTERNAL_REF.is_match(&text)
        && !INLINE_PAYLOAD.is_match(&text)
}

/// Sample up to `sample_size` evenly spaced entries and report whether at
/// least `skip_ratio` of them point at external content instead of inlining it.
pub fn mostly_references(log: &[Value], sample_size: usize, skip_ratio: f64) -> bool {
    if log.is_empty() || sample_size == 0 {
        return false;
    }
    let taken = sample_size.min(log.len());
    let step = log.len() as f64 / taken as f64;
    let references = (0..taken)
        .map(|i| &log[((i as f64 * step) as usize).min(log.len() - 1)])
        .filter(|entry| is_reference_entry(entry))
        .count();

    references as f64 / taken as f64 >= skip_ratio
}
