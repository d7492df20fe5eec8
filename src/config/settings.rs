use super::limits::ChatListConfig;
use crate::storage::BackendKind;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub limits: ChatListConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub path: PathBuf,
    pub quota_bytes: Option<usize>,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub channel_buffer_size: usize,
    /// Quiet period after which deferred work (index flush, queued saves) runs
    pub flush_idle_ms: u64,
    /// Upper bound on how long deferred work may wait under constant load
    pub max_flush_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: PathBuf::from("./data/chats"),
            quota_bytes: None,
            namespace: crate::core::key::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 100,
            flush_idle_ms: 50,
            max_flush_delay_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.limits.validate();
        Ok(settings)
    }
}
