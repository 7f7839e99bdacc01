//! Configuration loading and validation

use anyhow::{bail, Result};
use hive_core::{Platform, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub hive_mind: HiveMindConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Platform whose devices this controller manages
    #[serde(default = "default_platform")]
    pub platform: Platform,
    /// Delay between reconciliation passes in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Options passed through to every device handle
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            poll_interval_secs: default_poll_interval(),
            options: BTreeMap::new(),
        }
    }
}

fn default_platform() -> Platform {
    Platform::Ios
}

fn default_poll_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveMindConfig {
    /// Base URL of the Hive Mind server
    #[serde(default = "default_url")]
    pub url: String,
    /// Id of this hive; the hive registers itself when absent
    #[serde(default)]
    pub hive_id: Option<RecordId>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Set to false to always enumerate devices locally
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HiveMindConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            hive_id: None,
            timeout_secs: default_timeout(),
            enabled: true,
        }
    }
}

fn default_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout() -> u64 {
    hive_mind::DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.controller.poll_interval_secs == 0 {
            bail!("controller.poll_interval_secs must be greater than zero");
        }
        if self.hive_mind.enabled && self.hive_mind.url.trim().is_empty() {
            bail!("hive_mind.url must be set when Hive Mind is enabled");
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };

    config.validate()?;
    Ok(config)
}
