//! Resource pool of delegated sub-accounts
//!
//! The staking protocol lets each account hold only one pending unwind, so
//! the vault spreads unwinds over a set of delegated slots. A slot is busy
//! from the moment a position is opened on it until that position is claimed.
//!
//! Allocation is round robin: the scan starts just after the slot handed out
//! last, which keeps steady-state churn O(1) and never starves a slot.

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::types::{AccountId, SlotId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSlot {
    pub id: SlotId,
    /// Delegated sub-account handed to the staking adapter
    pub account: AccountId,
    pub busy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    slots: Vec<ResourceSlot>,
    /// Index of the most recently allocated slot
    last_allocated: Option<usize>,
    busy_count: usize,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slot backed by `account`. Administrative, off the hot path.
    pub fn provision(&mut self, account: AccountId) -> VaultResult<SlotId> {
        if self.slots.iter().any(|s| s.account == account) {
            return Err(VaultError::InvalidInput("account already provisioned"));
        }
        let index = u32::try_from(self.slots.len()).map_err(|_| VaultError::ArithmeticOverflow)?;
        let id = SlotId(index);
        self.slots.push(ResourceSlot {
            id,
            account,
            busy: false,
        });
        Ok(id)
    }

    /// Slot `allocate` would hand out next, without marking it busy
    pub fn peek_free(&self) -> VaultResult<SlotId> {
        let n = self.slots.len();
        if n == 0 || self.busy_count >= n {
            return Err(VaultError::slots_exhausted());
        }
        let start = self.last_allocated.map_or(0, |i| (i + 1) % n);
        (0..n)
            .map(|step| (start + step) % n)
            .find(|&i| !self.slots[i].busy)
            .map(|i| self.slots[i].id)
            .ok_or_else(VaultError::slots_exhausted)
    }

    pub fn allocate(&mut self) -> VaultResult<SlotId> {
        let id = self.peek_free()?;
        let index = id.0 as usize;
        self.slots[index].busy = true;
        self.last_allocated = Some(index);
        self.busy_count += 1;
        Ok(id)
    }

    pub fn release(&mut self, id: SlotId) -> VaultResult<()> {
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(VaultError::InvalidInput("unknown slot"))?;
        if !slot.busy {
            return Err(VaultError::InvalidState("slot is not busy"));
        }
        let busy_count = self
            .busy_count
            .checked_sub(1)
            .ok_or(VaultError::InvalidState("busy count out of sync"))?;
        slot.busy = false;
        self.busy_count = busy_count;
        Ok(())
    }

    pub fn get(&self, id: SlotId) -> Option<&ResourceSlot> {
        self.slots.get(id.0 as usize)
    }

    pub fn slots(&self) -> &[ResourceSlot] {
        &self.slots
    }

    pub fn busy_count(&self) -> usize {
        self.busy_count
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Slot ids match their index and the allocation cursor is in range
    pub fn is_well_formed(&self) -> bool {
        self.slots.iter().enumerate().all(|(i, s)| s.id.0 as usize == i)
            && self.last_allocated.map_or(true, |i| i < self.slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
