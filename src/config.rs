//! Runtime configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables (a `.env` file in the working directory is loaded
//! first, like the account API credentials have always been provided).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{MovementsError, Result};

const CONFIG_DIR_NAME: &str = "movimentacoes";
const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub listener: ListenerSettings,
    pub paths: PathSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub token_url: Option<String>,
    pub basic_auth: Option<String>,
    pub movement_url: Option<String>,
    /// Account registration endpoint; `{account_number}` is replaced by the client code
    pub account_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerSettings {
    pub bind: String,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Where raw `{clientCode}.csv` exports are delivered
    pub export_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub roster: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("."),
            reports_dir: PathBuf::from("relatorios"),
            roster: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub timeout_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

/// Credentials and endpoints required to talk to the account API
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub token_url: String,
    pub basic_auth: String,
    pub movement_url: String,
    pub account_url: Option<String>,
}

impl Settings {
    /// Load settings from `path` (or the default config file when present),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file loaded: {}", e);
        }

        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut settings = match file {
            Some(p) => {
                info!("Loading configuration from {:?}", p);
                let text = std::fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config file {:?}", p))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| MovementsError::Config(format!("invalid config file: {}", e)).into())
    }

    /// Apply overrides from a key lookup (the process environment in practice).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("API_URL_TOKEN") {
            self.api.token_url = Some(v);
        }
        if let Some(v) = lookup("BASIC_AUTH") {
            self.api.basic_auth = Some(v);
        }
        if let Some(v) = lookup("API_MOVEMENT_URL") {
            self.api.movement_url = Some(v);
        }
        if let Some(v) = lookup("API_URL_DADOS") {
            self.api.account_url = Some(v);
        }
        if let Some(v) = lookup("LISTENER_BIND") {
            self.listener.bind = v;
        }
        if let Some(v) = lookup("EXPORT_DIR") {
            self.paths.export_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REPORTS_DIR") {
            self.paths.reports_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROSTER_PATH") {
            self.paths.roster = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("BATCH_TIMEOUT_SECS") {
            self.batch.timeout_secs = v.trim().parse().map_err(|_| {
                MovementsError::Config(format!("BATCH_TIMEOUT_SECS is not a number: {}", v))
            })?;
        }
        Ok(())
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch.timeout_secs)
    }

    pub fn api_credentials(&self) -> Result<ApiCredentials> {
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| MovementsError::Config(format!("{} is not configured", name)))
        };

        Ok(ApiCredentials {
            token_url: require(&self.api.token_url, "API_URL_TOKEN")?,
            basic_auth: require(&self.api.basic_auth, "BASIC_AUTH")?,
            movement_url: require(&self.api.movement_url, "API_MOVEMENT_URL")?,
            account_url: self.api.account_url.clone(),
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME))
}
