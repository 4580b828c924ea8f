//! Vault health report built from a state snapshot

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use vault_engine::{check_invariants, InvariantReport, PositionId, SlotId, Timestamp, VaultState};

/// Share price is reported in 1e6 scale
pub const PRICE_SCALE: u128 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionLine {
    pub id: PositionId,
    pub slot: SlotId,
    pub book_value: u128,
    pub expected_value: u128,
    pub accrued_profit: u128,
    pub matures_at: Timestamp,
    /// Zero once matured
    pub seconds_to_maturity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueBacklog {
    pub live_requests: usize,
    pub escrowed_shares: u128,
    /// Assets the escrow would fetch at the current price
    pub owed_assets: u128,
    pub reserve: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultReport {
    pub now: Timestamp,
    pub total_assets: u128,
    pub total_shares: u128,
    pub price_per_share_e6: u128,
    pub idle_balance: u128,
    pub total_payables: u128,
    pub busy_slots: usize,
    pub total_slots: usize,
    pub active: Vec<PositionLine>,
    /// Claimable right now, in the order they must be claimed
    pub settleable: Vec<PositionId>,
    /// Not yet matured but within the horizon
    pub upcoming: Vec<PositionId>,
    pub backlog: QueueBacklog,
    pub invariants: InvariantReport,
}

impl VaultReport {
    pub fn is_healthy(&self) -> bool {
        self.invariants.all_hold()
    }
}

/// Read a JSON state snapshot
pub fn load_snapshot(path: &Path) -> Result<VaultState> {
    let bytes = std::fs::read(path).context(format!("Failed to read snapshot from {}", path.display()))?;
    let state = serde_json::from_slice(&bytes).context("Failed to parse snapshot JSON")?;
    Ok(state)
}

/// Positions that `settle_unwind` would accept at `now`, oldest first.
///
/// Claims are strictly FIFO, so the scan stops at the first immature one.
pub fn settleable_positions(state: &VaultState, now: Timestamp) -> Vec<PositionId> {
    let cooldown = state.cooldown_period();
    state
        .ledger()
        .active()
        .iter()
        .take_while(|p| p.is_matured(now, cooldown))
        .map(|p| p.id)
        .collect()
}

pub fn build_report(state: &VaultState, now: Timestamp, horizon_secs: u64) -> Result<VaultReport> {
    let cooldown = state.cooldown_period();
    let price = state.share_price(now);

    let active: Vec<PositionLine> = state
        .ledger()
        .active()
        .iter()
        .map(|p| {
            let matures_at = p.matures_at(cooldown);
            PositionLine {
                id: p.id,
                slot: p.slot,
                book_value: p.book_value,
                expected_value: p.expected_value,
                accrued_profit: p.accrued_profit(now, cooldown),
                matures_at,
                seconds_to_maturity: matures_at.saturating_sub(now),
            }
        })
        .collect();

    let upcoming = active
        .iter()
        .filter(|line| line.seconds_to_maturity > 0 && line.seconds_to_maturity <= horizon_secs)
        .map(|line| line.id)
        .collect();

    let escrowed_shares = state.queue().escrowed_shares();
    let owed_assets = price
        .assets_for(escrowed_shares)
        .context("Failed to price queued withdrawals")?;

    Ok(VaultReport {
        now,
        total_assets: price.total_assets,
        total_shares: price.total_shares,
        price_per_share_e6: price.per_share(PRICE_SCALE).context("Share price overflow")?,
        idle_balance: state.idle_balance(),
        total_payables: state.total_payables(),
        busy_slots: state.pool().busy_count(),
        total_slots: state.pool().len(),
        settleable: settleable_positions(state, now),
        upcoming,
        active,
        backlog: QueueBacklog {
            live_requests: state.queue().len(),
            escrowed_shares,
            owed_assets,
            reserve: state.queue_reserve(),
        },
        invariants: check_invariants(state, now),
    })
}

/// Emit the report through the logger
pub fn log_report(report: &VaultReport) {
    log::info!(
        "NAV {} over {} shares (price {:.6}), idle {}, payables {}",
        report.total_assets,
        report.total_shares,
        report.price_per_share_e6 as f64 / PRICE_SCALE as f64,
        report.idle_balance,
        report.total_payables
    );
    log::info!(
        "Slots busy {}/{}, active positions {}",
        report.busy_slots,
        report.total_slots,
        report.active.len()
    );
    for line in &report.active {
        log::debug!(
            "  {} on {}: book {} expected {} accrued {} matures_at {}",
            line.id,
            line.slot,
            line.book_value,
            line.expected_value,
            line.accrued_profit,
            line.matures_at
        );
    }
    if !report.settleable.is_empty() {
        log::info!("Settleable now: {:?}", report.settleable);
    }
    if !report.upcoming.is_empty() {
        log::info!("Maturing soon: {:?}", report.upcoming);
    }
    if report.backlog.live_requests > 0 {
        log::info!(
            "Queue backlog: {} requests, {} shares escrowed (~{} assets), reserve {}",
            report.backlog.live_requests,
            report.backlog.escrowed_shares,
            report.backlog.owed_assets,
            report.backlog.reserve
        );
    }
    if report.is_healthy() {
        log::info!("All invariants hold");
    } else {
        log::error!("Invariant violations: {:?}", report.invariants.violations());
    }
}
