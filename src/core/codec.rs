//! Message log codec
//!
//! Logs are stored as JSON arrays. A compression marker prefix is reserved;
//! values carrying it are accepted on read, but nothing writes it yet.

use serde_json::Value;

/// Reserved prefix for compressed payloads
pub const COMPRESSION_MARKER: &str = "\u{1}z:";

pub type MessageLog = Vec<Value>;

/// Serialize a log. Serializing a `Value` tree cannot fail.
pub fn serialize(data: &[Value]) -> String {
    serde_json::to_string(data).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a stored log, `None` for corrupt or foreign data
pub fn deserialize(raw: &str) -> Option<MessageLog> {
    let body = raw.strip_prefix(COMPRESSION_MARKER).unwrap_or(raw);
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => Some(items),
        Ok(_) => {
            tracing::warn!("[Codec] Stored value is not an array, ignoring");
            None
        }
        Err(e) => {
            tracing::warn!("[Codec] Failed to parse stored chat list: {}", e);
            None
        }
    }
}

/// Approximate size of already serialized text: 2 bytes per UTF-16 unit
pub fn text_size(serialized: &str) -> usize {
    serialized.encode_utf16().count() * 2
}

/// Approximate stored size of a log
pub fn size(data: &[Value]) -> usize {
    text_size(&serialize(data))
}
