//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/itemsync/config.toml)
//! 3. Environment variables (ITEMSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::controller::RollbackPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "ITEMSYNC";

/// API root used when nothing is configured
pub const DEFAULT_API_URL: &str = "http://localhost:3000/v1";

/// Keys accepted by [`Config::set`]
pub const CONFIG_KEYS: &[&str] = &["api_url", "rollback"];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root URL of the items API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// How failed mutations are undone
    #[serde(default)]
    pub rollback: RollbackPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            rollback: RollbackPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (ITEMSYNC_API_URL, ITEMSYNC_ROLLBACK)
    /// 2. Config file (~/.config/itemsync/config.toml or ITEMSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // ITEMSYNC_API_URL
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_url = val;
            }
        }

        // ITEMSYNC_ROLLBACK
        if let Ok(val) = std::env::var(format!("{}_ROLLBACK", ENV_PREFIX)) {
            self.rollback = val
                .parse::<RollbackPolicy>()
                .map_err(|e: String| anyhow!(e))
                .with_context(|| format!("Invalid {}_ROLLBACK", ENV_PREFIX))?;
        }

        Ok(())
    }

    /// Set a value by key, as given on the command line
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => {
                if value.trim().is_empty() {
                    bail!("api_url cannot be empty");
                }
                self.api_url = value.trim().to_string();
            }
            "rollback" => {
                self.rollback = value.parse::<RollbackPolicy>().map_err(|e: String| anyhow!(e))?;
            }
            _ => bail!(
                "Unknown configuration key '{}'. Valid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with ITEMSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("itemsync")
            .join("config.toml")
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
