//! Share accounting
//!
//! Escrowed shares leave the owner's spendable balance but stay in the total
//! supply until they are burned at fulfilment or handed back on cancel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::types::AccountId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareBook {
    balances: BTreeMap<AccountId, u128>,
    total_supply: u128,
    escrowed: u128,
}

impl ShareBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, owner: &AccountId) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    /// Outstanding shares, escrow included
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn escrowed(&self) -> u128 {
        self.escrowed
    }

    pub fn mint(&mut self, owner: &AccountId, shares: u128) -> VaultResult<()> {
        let supply = self.total_supply.checked_add(shares).ok_or(VaultError::ArithmeticOverflow)?;
        let entry = self.balances.entry(*owner).or_insert(0);
        *entry = entry.checked_add(shares).ok_or(VaultError::ArithmeticOverflow)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Burn spendable shares straight from `owner`
    pub fn burn(&mut self, owner: &AccountId, shares: u128) -> VaultResult<()> {
        let supply = self.shrink_supply(shares)?;
        self.debit(owner, shares)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Move shares from `owner` into escrow
    pub fn escrow(&mut self, owner: &AccountId, shares: u128) -> VaultResult<()> {
        self.debit(owner, shares)?;
        self.escrowed += shares;
        Ok(())
    }

    /// Return escrowed shares to `owner`
    pub fn release_escrow(&mut self, owner: &AccountId, shares: u128) -> VaultResult<()> {
        if shares > self.escrowed {
            return Err(VaultError::InvalidState("release exceeds escrow"));
        }
        self.escrowed -= shares;
        *self.balances.entry(*owner).or_insert(0) += shares;
        Ok(())
    }

    /// Destroy escrowed shares after their assets were paid out
    pub fn burn_escrowed(&mut self, shares: u128) -> VaultResult<()> {
        if shares > self.escrowed {
            return Err(VaultError::InvalidState("burn exceeds escrow"));
        }
        let supply = self.shrink_supply(shares)?;
        self.escrowed -= shares;
        self.total_supply = supply;
        Ok(())
    }

    /// Spendable balances plus escrow add up to the total supply
    pub fn is_well_formed(&self) -> bool {
        self.balances
            .values()
            .try_fold(self.escrowed, |acc, b| acc.checked_add(*b))
            == Some(self.total_supply)
    }

    fn shrink_supply(&self, shares: u128) -> VaultResult<u128> {
        self.total_supply
            .checked_sub(shares)
            .ok_or(VaultError::InvalidState("burn exceeds total supply"))
    }

    fn debit(&mut self, owner: &AccountId, shares: u128) -> VaultResult<()> {
        let balance = self.balances.get_mut(owner).ok_or(VaultError::InvalidInput("insufficient shares"))?;
        if *balance < shares {
            return Err(VaultError::InvalidInput("insufficient shares"));
        }
        *balance -= shares;
        if *balance == 0 {
            self.balances.remove(owner);
        }
        Ok(())
    }
}
