use thiserror::Error;

/// Errors surfaced by a key/value backend.
///
/// The engine only distinguishes quota exhaustion from everything else:
/// quota failures trigger one evict-and-retry cycle, all other failures are
/// logged and treated as a failed write.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("quota exceeded writing '{key}': requested {requested} bytes, {available} available")]
    QuotaExceeded {
        key: String,
        requested: usize,
        available: usize,
    },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
