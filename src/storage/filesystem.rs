//! File System Key/Value Store
//!
//! Information Hiding:
//! - File naming and key escaping hidden from users
//! - Directory structure management hidden behind the port
//! - Writes land in a temporary file and are renamed into place

use super::{entry_footprint, KeyValueStore};
use crate::error::{StoreError, StoreResult};
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

const FILE_EXTENSION: &str = "json";

/// File system store - each key is a JSON file
/// Files are stored as {base_path}/{escaped key}.json
pub struct FileSystemStore {
    base_path: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileSystemStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&base_path).context("Failed to create storage directory")?;

        Ok(Self {
            base_path,
            quota_bytes: None,
        })
    }

    /// Enforce the same UTF-16 footprint quota the in-memory store uses
    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", escape_key(key), FILE_EXTENSION))
    }

    fn used_bytes_excluding(&self, key: &str) -> StoreResult<usize> {
        let mut used = 0;
        for existing in self.keys()? {
            if existing == key {
                continue;
            }
            if let Some(value) = self.get(&existing)? {
                used += entry_footprint(&existing, &value);
            }
        }
        Ok(used)
    }
}

/// Percent-escape everything outside `[A-Za-z0-9._-]` so keys map to portable file names
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                escaped.push(byte as char)
            }
            _ => escaped.push_str(&format!("%{:02X}", byte)),
        }
    }
    escaped
}

fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl KeyValueStore for FileSystemStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("[FileSystemStore] Key '{}' does not exist", key);
                Ok(None)
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes_excluding(key)?;
            let requested = entry_footprint(key, value);
            if used + requested > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available: quota.saturating_sub(used),
                });
            }
        }

        let path = self.key_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!("[FileSystemStore] Wrote '{}' to {:?}", key, path);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("[FileSystemStore] Deleted '{}' at {:?}", key, path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("[FileSystemStore] Key '{}' does not exist, nothing to delete", key);
                Ok(())
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(unescape_key)
            {
                keys.push(key);
            }
        }

        tracing::debug!("[FileSystemStore] Listed {} keys", keys.len());
        Ok(keys)
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.key_path(key).exists())
    }
}
