//! Keeper configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// JSON snapshot of the vault state written by the host
    pub snapshot_path: String,

    /// Polling interval in seconds (watch mode)
    pub poll_interval_secs: u64,

    /// Keep re-reading the snapshot instead of reporting once
    pub watch: bool,

    /// Positions maturing within this many seconds are flagged as upcoming
    pub maturity_horizon_secs: u64,

    /// Report as of this unix time instead of the wall clock
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now_override: Option<u64>,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "~/.unwind-vault/state.json".to_string(),
            poll_interval_secs: 60,
            watch: false,
            maturity_horizon_secs: 24 * 60 * 60,
            now_override: None,
        }
    }
}

impl KeeperConfig {
    /// Load configuration from the TOML file named by `KEEPER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KEEPER_CONFIG").unwrap_or_else(|_| "keeper-config.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self> {
        let config: KeeperConfig = toml::from_str(config_str).context("Failed to parse config TOML")?;
        if config.watch && config.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive in watch mode");
        }
        Ok(config)
    }

    /// Snapshot path with `~` expanded
    pub fn snapshot_file(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.snapshot_path).as_ref())
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let toml_str = toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;

        std::fs::write(path, toml_str).context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}
