//! Application configuration management.
//!
//! Configuration is stored at `~/.config/costguard/config.json`. Missing
//! files and missing fields fall back to defaults, and `COSTGUARD_API_URL` /
//! `COSTGUARD_TOKEN_STORE` override whatever the file says.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "costguard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "https://dl6q0k9s90.execute-api.us-east-1.amazonaws.com/dev";

/// Refresh tokens this many seconds before they actually expire.
const DEFAULT_REFRESH_LEEWAY_SECS: i64 = 60;

/// Larger leeways are clamped; a day already means "refresh every time".
const MAX_REFRESH_LEEWAY_SECS: i64 = 86_400;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "COSTGUARD_API_URL";
pub const ENV_TOKEN_STORE: &str = "COSTGUARD_TOKEN_STORE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StoreBackend::File),
            "keyring" | "keychain" => Ok(StoreBackend::Keyring),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown token store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub token_store: StoreBackend,
    pub refresh_leeway_secs: i64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_store: StoreBackend::default(),
            refresh_leeway_secs: DEFAULT_REFRESH_LEEWAY_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::parse(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        debug!(api = %config.api_base_url, store = ?config.token_store, "Config loaded");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var(ENV_API_URL).filter(|u| !u.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(backend) = var(ENV_TOKEN_STORE).filter(|b| !b.is_empty()) {
            self.token_store = backend.parse()?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Build the token store selected by `token_store`.
    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>> {
        Ok(match self.token_store {
            StoreBackend::File => Arc::new(FileTokenStore::new(self.data_dir()?.join("session"))),
            StoreBackend::Keyring => Arc::new(KeyringTokenStore::new()),
            StoreBackend::Memory => Arc::new(MemoryTokenStore::new()),
        })
    }

    pub fn refresh_leeway(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_leeway_secs.clamp(0, MAX_REFRESH_LEEWAY_SECS))
    }
}
