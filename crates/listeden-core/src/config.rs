//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, the token store backend, and the last
//! used login identifier.
//!
//! Configuration is stored at `~/.config/listeden/config.json`. Environment
//! variables override the file; see [`Config::apply_env`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiClient, DEFAULT_BASE_URL};
use crate::auth::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionController, TokenStore};

/// Application name used for config/data directory paths and the keychain service
pub const APP_NAME: &str = "listeden";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default HTTP request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "LISTEDEN_API_URL";
pub const ENV_TOKEN_STORE: &str = "LISTEDEN_TOKEN_STORE";
pub const ENV_IDENTIFIER: &str = "LISTEDEN_IDENTIFIER";

/// Where the session token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    /// JSON preferences file in the app data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Not persisted; the session ends with the process
    Memory,
}

impl FromStr for TokenBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(TokenBackend::File),
            "keyring" | "keychain" => Ok(TokenBackend::Keyring),
            "memory" => Ok(TokenBackend::Memory),
            other => Err(format!("unknown token store '{}' (expected file, keyring or memory)", other)),
        }
    }
}

impl fmt::Display for TokenBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenBackend::File => "file",
            TokenBackend::Keyring => "keyring",
            TokenBackend::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub token_backend: TokenBackend,
    pub request_timeout_secs: Option<u64>,
    pub last_identifier: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// App-private directory holding the token preferences file
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Override settings from `LISTEDEN_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(backend) = non_empty(ENV_TOKEN_STORE) {
            self.token_backend = backend
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}", ENV_TOKEN_STORE))?;
        }
        if let Some(identifier) = non_empty(ENV_IDENTIFIER) {
            self.last_identifier = Some(identifier);
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.token_backend {
            TokenBackend::File => Arc::new(FileTokenStore::new(Self::data_dir()?)),
            TokenBackend::Keyring => Arc::new(
                KeyringTokenStore::new(APP_NAME).context("Failed to open keychain entry")?,
            ),
            TokenBackend::Memory => Arc::new(MemoryTokenStore::new()),
        };
        debug!(backend = %self.token_backend, "Token store opened");
        Ok(store)
    }

    /// Wire the token store, API client and session controller together
    pub fn build_session(&self) -> Result<SessionController> {
        let store = self.open_token_store()?;
        let client = ApiClient::with_timeout(self.base_url(), Arc::clone(&store), self.request_timeout())
            .context("Failed to create API client")?;
        Ok(SessionController::new(client, store))
    }
}
