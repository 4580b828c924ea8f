//! Unwind Vault Keeper
//!
//! Read-only monitor: loads the vault state snapshot written by the host,
//! reports valuation, settleable positions and queue backlog, and checks
//! the vault invariants. It never submits operations.

mod config;
mod health;

use anyhow::{Context, Result};
use config::KeeperConfig;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Unwind Vault Keeper");

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("--write-default") {
        let target = args.get(2).map(String::as_str).unwrap_or("keeper-config.toml");
        return KeeperConfig::write_default(target);
    }

    // Load configuration
    let config = KeeperConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using defaults", e);
        KeeperConfig::default()
    });

    log::info!("Snapshot: {}", config.snapshot_file().display());

    if !config.watch {
        return report_once(&config);
    }

    log::info!("Watching every {}s", config.poll_interval_secs);
    let mut interval = time::interval(Duration::from_secs(config.poll_interval_secs));

    loop {
        interval.tick().await;

        if let Err(e) = report_once(&config) {
            log::error!("Error building report: {:#}", e);
        }
    }
}

fn report_once(config: &KeeperConfig) -> Result<()> {
    let state = health::load_snapshot(&config.snapshot_file())?;
    let now = match config.now_override {
        Some(now) => now,
        None => unix_now()?,
    };
    let report = health::build_report(&state, now, config.maturity_horizon_secs)?;
    health::log_report(&report);
    log::debug!("{}", serde_json::to_string(&report).context("Failed to serialize report")?);
    Ok(())
}

fn unix_now() -> Result<u64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock before unix epoch")?;
    Ok(elapsed.as_secs())
}
