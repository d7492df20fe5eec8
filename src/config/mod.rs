pub mod limits;
pub mod settings;

pub use limits::{ChatListConfig, ChatListConfigPatch};
pub use settings::{EngineConfig, LoggingConfig, Settings, StorageConfig};
