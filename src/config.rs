//! Configuration management for the token ledger node.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::runtime::GenesisAccount;
use crate::types::{Address, Coins};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub genesis: Vec<GenesisEntry>,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One `[[genesis]]` table: a hex address and a coin expression.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisEntry {
    pub address: String,
    pub coins: String,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.path must be set".to_string()));
        }
        self.genesis_accounts()?;
        Ok(())
    }

    pub fn genesis_accounts(&self) -> Result<Vec<GenesisAccount>, ConfigError> {
        self.genesis
            .iter()
            .enumerate()
            .map(|(i, entry)| -> Result<GenesisAccount, ConfigError> {
                let address = entry
                    .address
                    .parse::<Address>()
                    .map_err(|e| ConfigError::Invalid(format!("genesis[{i}].address: {e}")))?;
                let coins = entry
                    .coins
                    .parse::<Coins>()
                    .map_err(|e| ConfigError::Invalid(format!("genesis[{i}].coins: {e}")))?;
                Ok(GenesisAccount { address, coins })
            })
            .collect()
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Config::from_toml(&text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
