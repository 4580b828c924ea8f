//! Vault parameters and caller policies

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::types::AccountId;

/// Hard ceiling on `max_withdrawals_per_batch`; payout batches are stack-allocated
pub const MAX_WITHDRAWALS_PER_BATCH: usize = 64;

/// Highest configurable performance fee (50%)
pub const MAX_PERFORMANCE_FEE_BPS: u16 = 5_000;

pub const DEFAULT_COOLDOWN_PERIOD: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_CANCEL_COOLDOWN_SECS: u64 = 5 * 60;
/// One whole unit of an 18-decimal asset
pub const DEFAULT_MIN_WITHDRAWAL_ASSETS: u128 = 1_000_000_000_000_000_000;

/// Who may invoke a gated operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "accounts", rename_all = "snake_case")]
pub enum CallerPolicy {
    Anyone,
    AllowList(BTreeSet<AccountId>),
}

impl CallerPolicy {
    pub fn allow_list<I: IntoIterator<Item = AccountId>>(accounts: I) -> Self {
        CallerPolicy::AllowList(accounts.into_iter().collect())
    }

    pub fn permits(&self, caller: &AccountId) -> bool {
        match self {
            CallerPolicy::Anyone => true,
            CallerPolicy::AllowList(accounts) => accounts.contains(caller),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// May provision slots and change parameters
    pub admin: AccountId,
    /// Receives the performance fee
    pub fee_recipient: AccountId,
    /// Share of realized profit taken at claim (0..=5000)
    pub performance_fee_bps: u16,
    /// Minimum expected profit relative to book value when opening
    pub min_profit_bps: u16,
    /// Seconds between opening a position and being able to claim it
    pub cooldown_period: u64,
    /// Cap on concurrently active positions; bounds valuation cost
    pub max_active_positions: u32,
    /// Smallest withdrawal request, in asset units
    pub min_withdrawal_assets: u128,
    /// Minimum dwell before a queued request may be cancelled
    pub cancel_cooldown_secs: u64,
    /// Queue entries visited per drain
    pub max_withdrawals_per_batch: u32,
    /// Who may open positions
    pub unwind_callers: CallerPolicy,
    /// Who may claim matured positions
    pub settle_callers: CallerPolicy,
    /// Swap routers the coordinator will call
    pub allowed_routers: BTreeSet<AccountId>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            admin: AccountId::default(),
            fee_recipient: AccountId::default(),
            performance_fee_bps: 1_000,
            min_profit_bps: 10,
            cooldown_period: DEFAULT_COOLDOWN_PERIOD,
            max_active_positions: 50,
            min_withdrawal_assets: DEFAULT_MIN_WITHDRAWAL_ASSETS,
            cancel_cooldown_secs: DEFAULT_CANCEL_COOLDOWN_SECS,
            max_withdrawals_per_batch: 20,
            unwind_callers: CallerPolicy::AllowList(BTreeSet::new()),
            settle_callers: CallerPolicy::Anyone,
            allowed_routers: BTreeSet::new(),
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> VaultResult<()> {
        if self.performance_fee_bps > MAX_PERFORMANCE_FEE_BPS {
            return Err(VaultError::InvalidInput("performance fee above 5000 bps"));
        }
        if self.cooldown_period == 0 {
            return Err(VaultError::InvalidInput("cooldown period must be positive"));
        }
        if self.max_active_positions == 0 {
            return Err(VaultError::InvalidInput("max active positions must be positive"));
        }
        if self.max_withdrawals_per_batch == 0
            || self.max_withdrawals_per_batch as usize > MAX_WITHDRAWALS_PER_BATCH
        {
            return Err(VaultError::InvalidInput("withdrawal batch must be within 1..=64"));
        }
        Ok(())
    }

    /// Batch size actually used by drains
    pub fn batch_limit(&self) -> usize {
        (self.max_withdrawals_per_batch as usize).clamp(1, MAX_WITHDRAWALS_PER_BATCH)
    }
}

/// A single admin parameter change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "param", content = "value", rename_all = "snake_case")]
pub enum ParamChange {
    PerformanceFeeBps(u16),
    MinProfitBps(u16),
    CooldownPeriod(u64),
    MaxActivePositions(u32),
    MinWithdrawalAssets(u128),
    CancelCooldownSecs(u64),
    MaxWithdrawalsPerBatch(u32),
    FeeRecipient(AccountId),
    UnwindCallers(CallerPolicy),
    SettleCallers(CallerPolicy),
    AllowRouter(AccountId),
    DisallowRouter(AccountId),
}

impl ParamChange {
    /// Apply to a copy of `config` and validate; `config` is untouched on error
    pub fn applied_to(&self, config: &VaultConfig) -> VaultResult<VaultConfig> {
        let mut next = config.clone();
        match self {
            ParamChange::PerformanceFeeBps(v) => next.performance_fee_bps = *v,
            ParamChange::MinProfitBps(v) => next.min_profit_bps = *v,
            ParamChange::CooldownPeriod(v) => next.cooldown_period = *v,
            ParamChange::MaxActivePositions(v) => next.max_active_positions = *v,
            ParamChange::MinWithdrawalAssets(v) => next.min_withdrawal_assets = *v,
            ParamChange::CancelCooldownSecs(v) => next.cancel_cooldown_secs = *v,
            ParamChange::MaxWithdrawalsPerBatch(v) => next.max_withdrawals_per_batch = *v,
            ParamChange::FeeRecipient(v) => next.fee_recipient = *v,
            ParamChange::UnwindCallers(p) => next.unwind_callers = p.clone(),
            ParamChange::SettleCallers(p) => next.settle_callers = p.clone(),
            ParamChange::AllowRouter(r) => {
                next.allowed_routers.insert(*r);
            }
            ParamChange::DisallowRouter(r) => {
                next.allowed_routers.remove(r);
            }
        }
        next.validate()?;
        Ok(next)
    }
}
