//! TOML configuration for the CLI and [`crate::core::UploadManager::from_config`]

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;
use crate::core::TransferConfig;

pub const DEFAULT_STORAGE_URL: &str = "https://api.cloudinary.com/v1_1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct BackendConfig {
    pub api_base: String,
    /// Bearer token for the backend API
    pub token: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub base_url: String,
    /// Provider account (cloud name)
    pub account: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STORAGE_URL.to_string(),
            account: String::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub transfer: TransferSection,
    pub log_level: Option<String>,
}

/// `[transfer]` as written in the file; see [`TransferConfig`]
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TransferSection {
    pub chunk_size: u64,
    pub chunk_threshold: u64,
    pub request_timeout_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for TransferSection {
    fn default() -> Self {
        let defaults = TransferConfig::default();

        Self {
            chunk_size: defaults.chunk_size,
            chunk_threshold: defaults.chunk_threshold,
            request_timeout_secs: defaults.request_timeout.as_secs(),
            cache_dir: None,
        }
    }
}

impl From<&TransferSection> for TransferConfig {
    fn from(section: &TransferSection) -> Self {
        let defaults = TransferConfig::default();

        Self {
            chunk_size: section.chunk_size,
            chunk_threshold: section.chunk_threshold,
            request_timeout: Duration::from_secs(section.request_timeout_secs),
            cache_dir: section.cache_dir.clone().unwrap_or(defaults.cache_dir),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.api_base.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.api_base is required".into()));
        }
        if self.storage.account.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.account is required".into()));
        }
        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::Invalid("transfer.chunk_size must be greater than zero".into()));
        }
        if self.transfer.chunk_threshold == 0 {
            return Err(ConfigError::Invalid("transfer.chunk_threshold must be greater than zero".into()));
        }
        if self.transfer.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("transfer.request_timeout_secs must be greater than zero".into()));
        }

        Ok(())
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig::from(&self.transfer)
    }
}
