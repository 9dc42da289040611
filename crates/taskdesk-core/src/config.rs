//! Application configuration management.
//!
//! Holds the API base URL, the token store backend, the request timeout and
//! the last email used to log in. Stored at `~/.config/taskdesk/config.json`;
//! `TASKDESK_API_URL`, `TASKDESK_TOKEN_BACKEND` and
//! `TASKDESK_STORE_PASSPHRASE` override it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::api::SessionClient;
use crate::auth::{FileTokenStore, KeyringTokenStore, TokenStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "taskdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const API_URL_ENV: &str = "TASKDESK_API_URL";
const TOKEN_BACKEND_ENV: &str = "TASKDESK_TOKEN_BACKEND";
const PASSPHRASE_ENV: &str = "TASKDESK_STORE_PASSPHRASE";

/// HTTP request timeout when none is configured.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the token pair is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    Keyring,
    File,
}

impl FromStr for TokenBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(TokenBackend::Keyring),
            "file" => Ok(TokenBackend::File),
            other => Err(anyhow::anyhow!(
                "Unknown token backend {:?} (expected \"keyring\" or \"file\")",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_email: Option<String>,
    #[serde(default)]
    pub token_backend: TokenBackend,
    pub request_timeout_secs: Option<u64>,
    /// Only ever read from the environment, never written to disk
    #[serde(skip)]
    pub store_passphrase: Option<String>,
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
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

    /// Directory holding file-backed token stores.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = set(API_URL_ENV) {
            self.api_url = Some(url);
        }
        if let Some(backend) = set(TOKEN_BACKEND_ENV) {
            self.token_backend = backend
                .parse()
                .with_context(|| format!("Invalid {}", TOKEN_BACKEND_ENV))?;
        }
        if let Some(passphrase) = set(PASSPHRASE_ENV) {
            self.store_passphrase = Some(passphrase);
        }
        Ok(())
    }

    pub fn api_url(&self) -> Result<&str> {
        self.api_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No API URL configured. Set {} or pass --api-url.",
                API_URL_ENV
            )
        })
    }

    /// Scheme, host and port of the API; token stores are keyed by it.
    pub fn origin(&self) -> Result<String> {
        let url = Url::parse(self.api_url()?).context("Invalid API URL")?;
        Ok(url.origin().ascii_serialization())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let origin = self.origin()?;
        match self.token_backend {
            TokenBackend::Keyring => Ok(Arc::new(
                KeyringTokenStore::new(origin).context("Failed to open the OS keychain")?,
            )),
            TokenBackend::File => {
                let dir = FileTokenStore::origin_dir(&Self::data_dir()?, &origin);
                let store = FileTokenStore::new(dir);
                Ok(Arc::new(match self.store_passphrase {
                    Some(ref passphrase) => store.with_passphrase(passphrase.clone()),
                    None => store,
                }))
            }
        }
    }

    pub fn session_client(&self) -> Result<SessionClient> {
        let store = self.open_token_store()?;
        SessionClient::with_timeout(self.api_url()?, store, self.request_timeout())
            .context("Failed to create session client")
    }
}
