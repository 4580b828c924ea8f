//! Vault state owned by the coordinator
//!
//! Fields are crate-private: the coordinator's operations are the only
//! writers, so every invariant can be checked against this one struct.
//! The whole state is serde-serializable for host persistence and for the
//! keeper's read-only reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::VaultConfig;
use crate::ledger::{PositionLedger, Valuation};
use crate::math::add_u128;
use crate::nav::{NavEngine, SharePrice};
use crate::pool::ResourcePool;
use crate::queue::WithdrawalQueue;
use crate::shares::ShareBook;
use crate::types::{AccountId, PositionId, Timestamp};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultState {
    pub(crate) config: VaultConfig,
    /// Cash free for new positions or instant withdrawals
    pub(crate) idle_balance: u128,
    /// Cash earmarked for queued withdrawals after a batch-limited drain
    pub(crate) queue_reserve: u128,
    /// Outbound transfers that failed and await `claim_payable`
    pub(crate) payables: BTreeMap<AccountId, u128>,
    pub(crate) pool: ResourcePool,
    pub(crate) ledger: PositionLedger,
    pub(crate) queue: WithdrawalQueue,
    pub(crate) shares: ShareBook,
}

impl VaultState {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn idle_balance(&self) -> u128 {
        self.idle_balance
    }

    pub fn queue_reserve(&self) -> u128 {
        self.queue_reserve
    }

    pub fn total_shares(&self) -> u128 {
        self.shares.total_supply()
    }

    pub fn first_active_position_id(&self) -> PositionId {
        self.ledger.first_active_id()
    }

    pub fn next_position_id(&self) -> PositionId {
        self.ledger.next_id()
    }

    pub fn performance_fee_bps(&self) -> u16 {
        self.config.performance_fee_bps
    }

    pub fn min_profit_bps(&self) -> u16 {
        self.config.min_profit_bps
    }

    pub fn cooldown_period(&self) -> u64 {
        self.config.cooldown_period
    }

    pub fn max_active_positions(&self) -> u32 {
        self.config.max_active_positions
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn queue(&self) -> &WithdrawalQueue {
        &self.queue
    }

    pub fn shares(&self) -> &ShareBook {
        &self.shares
    }

    pub fn payable(&self, account: &AccountId) -> u128 {
        self.payables.get(account).copied().unwrap_or(0)
    }

    pub fn total_payables(&self) -> u128 {
        self.payables.values().fold(0, |acc, v| add_u128(acc, *v))
    }

    pub fn valuation(&self, now: Timestamp) -> Valuation {
        self.ledger.valuation(now, self.config.cooldown_period)
    }

    pub fn total_assets(&self, now: Timestamp) -> u128 {
        NavEngine::total_assets(self.idle_balance, self.queue_reserve, &self.valuation(now))
    }

    pub fn share_price(&self, now: Timestamp) -> SharePrice {
        NavEngine::price(
            self.idle_balance,
            self.queue_reserve,
            &self.valuation(now),
            self.total_shares(),
        )
    }

    pub(crate) fn add_payable(&mut self, account: AccountId, amount: u128) {
        let entry = self.payables.entry(account).or_insert(0);
        *entry = add_u128(*entry, amount);
    }
}
