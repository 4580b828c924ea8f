//! Net asset value and share pricing
//!
//! `total_assets = idle + queue_reserve + book + accrued`. Deferred payables
//! are liabilities and never enter NAV. All conversions round in the vault's
//! favour: shares minted and assets paid round down, shares burned for a
//! partial payout round up.

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::ledger::Valuation;
use crate::math::{add_u128, mul_div_ceil, mul_div_floor};

/// NAV snapshot used to price one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePrice {
    pub total_assets: u128,
    pub total_shares: u128,
}

impl SharePrice {
    pub fn new(total_assets: u128, total_shares: u128) -> Self {
        Self {
            total_assets,
            total_shares,
        }
    }

    /// Shares minted for a deposit of `assets` (1:1 into an empty vault)
    pub fn shares_for_deposit(&self, assets: u128) -> VaultResult<u128> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        if self.total_assets == 0 {
            return Err(VaultError::InvalidInput("vault has shares but no assets"));
        }
        mul_div_floor(assets, self.total_shares, self.total_assets).ok_or(VaultError::ArithmeticOverflow)
    }

    /// Assets owed for `shares`, rounded down
    pub fn assets_for(&self, shares: u128) -> VaultResult<u128> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        mul_div_floor(shares, self.total_assets, self.total_shares).ok_or(VaultError::ArithmeticOverflow)
    }

    /// Shares that must be surrendered to receive `assets`, rounded up
    pub fn shares_to_burn_for(&self, assets: u128) -> VaultResult<u128> {
        if self.total_assets == 0 {
            return Ok(self.total_shares);
        }
        mul_div_ceil(assets, self.total_shares, self.total_assets).ok_or(VaultError::ArithmeticOverflow)
    }

    /// Price of one share scaled by `scale` (e.g. 1e6 for display)
    pub fn per_share(&self, scale: u128) -> Option<u128> {
        if self.total_shares == 0 {
            return Some(scale);
        }
        mul_div_floor(self.total_assets, scale, self.total_shares)
    }
}

/// Aggregates cash balances and the ledger valuation
pub struct NavEngine;

impl NavEngine {
    pub fn total_assets(idle: u128, queue_reserve: u128, valuation: &Valuation) -> u128 {
        add_u128(add_u128(idle, queue_reserve), valuation.total())
    }

    pub fn price(idle: u128, queue_reserve: u128, valuation: &Valuation, total_shares: u128) -> SharePrice {
        SharePrice::new(Self::total_assets(idle, queue_reserve, valuation), total_shares)
    }
}
