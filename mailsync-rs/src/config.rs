use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub sync: SyncSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Sequence numbers per FETCH round trip.
    pub fetch_batch_size: usize,
    /// Lookback window for a full resync or a never-synced folder.
    pub full_lookback_days: i64,
    /// Lookback window for an incremental run.
    pub incremental_lookback_days: i64,
    /// Messages whose reported RFC822.SIZE exceeds this are never inserted.
    pub max_message_size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl SyncSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::SyncError::Config(e.to_string()))?;

        toml::from_str(&content)
            .map_err(|e| crate::error::SyncError::Config(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                database_url: "sqlite://crm.db?mode=rwc".to_string(),
            },
            sync: SyncSettings::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
            fetch_batch_size: 50,
            full_lookback_days: 90,
            incremental_lookback_days: 30,
            max_message_size: 5 * 1024 * 1024, // 5MB
        }
    }
}
