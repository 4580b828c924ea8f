//! FIFO position ledger with bounded time-weighted accrual
//!
//! Positions are appended with strictly increasing ids and claimed strictly
//! oldest first, so the active set is always the contiguous id range
//! `[first_active, next_id)`. Valuation walks exactly that range.
//!
//! Each position recognizes its profit linearly over the cooldown period:
//!
//! ```plain
//! accrued(t) = (expected - book) * min(t - start, cooldown) / cooldown
//! ```
//!
//! Integer division rounds toward zero, so accrual can lag the true value by
//! less than one unit per position but never runs ahead of it. Once a
//! position has matured its contribution stops growing, however late it is
//! claimed. A vault-wide "accrual rate" summed across positions cannot make
//! that guarantee: the rate keeps applying to matured positions until someone
//! claims them, overstating NAV in the meantime.

use serde::{Deserialize, Serialize};

use crate::error::{Resource, VaultError, VaultResult};
use crate::math::{add_u128, pro_rata, sub_u128};
use crate::types::{PositionId, SlotId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    /// Staked tokens committed to the unwind
    pub stake_amount: u128,
    /// Assets spent acquiring the stake
    pub book_value: u128,
    /// Assets the unwind is expected to return
    pub expected_value: u128,
    pub start_time: Timestamp,
    pub claimed: bool,
    pub slot: SlotId,
    /// Ticket issued by the staking adapter
    pub claim_id: u64,
    /// Adapter-reported maturity; informational
    pub maturity_time: Timestamp,
}

impl Position {
    pub fn max_profit(&self) -> u128 {
        sub_u128(self.expected_value, self.book_value)
    }

    pub fn accrued_profit(&self, now: Timestamp, cooldown: u64) -> u128 {
        let elapsed = now.saturating_sub(self.start_time);
        pro_rata(self.max_profit(), elapsed, cooldown)
    }

    pub fn matures_at(&self, cooldown: u64) -> Timestamp {
        self.start_time.saturating_add(cooldown)
    }

    pub fn is_matured(&self, now: Timestamp, cooldown: u64) -> bool {
        now >= self.matures_at(cooldown)
    }
}

/// Everything `open` needs besides what the ledger assigns itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPosition {
    pub stake_amount: u128,
    pub book_value: u128,
    pub expected_value: u128,
    pub slot: SlotId,
    pub claim_id: u64,
    pub maturity_time: Timestamp,
}

/// Aggregate value of the active range at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub total_book_value: u128,
    pub total_accrued_profit: u128,
}

impl Valuation {
    pub fn total(&self) -> u128 {
        add_u128(self.total_book_value, self.total_accrued_profit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLedger {
    /// Append-only; `positions[i].id == PositionId(i)`
    positions: Vec<Position>,
    first_active: u64,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `new` against the ledger without recording it
    pub fn check_open(&self, new: &NewPosition, max_active: u32) -> VaultResult<()> {
        if new.stake_amount == 0 {
            return Err(VaultError::InvalidInput("stake amount must be positive"));
        }
        if new.book_value == 0 {
            return Err(VaultError::InvalidInput("book value must be positive"));
        }
        if new.expected_value < new.book_value {
            return Err(VaultError::InvalidInput("expected value below book value"));
        }
        // Reported value may at most double the cost
        if new.expected_value / 2 > new.book_value {
            return Err(VaultError::InvalidInput("expected value implausibly high"));
        }
        self.check_capacity(max_active)
    }

    pub fn check_capacity(&self, max_active: u32) -> VaultResult<()> {
        if self.active_count() >= max_active as u64 {
            return Err(VaultError::ResourceExhausted {
                resource: Resource::PositionCapacity,
            });
        }
        Ok(())
    }

    pub fn open(&mut self, new: NewPosition, max_active: u32, now: Timestamp) -> VaultResult<PositionId> {
        self.check_open(&new, max_active)?;

        let id = self.next_id();
        self.positions.push(Position {
            id,
            stake_amount: new.stake_amount,
            book_value: new.book_value,
            expected_value: new.expected_value,
            start_time: now,
            claimed: false,
            slot: new.slot,
            claim_id: new.claim_id,
            maturity_time: new.maturity_time,
        });
        Ok(id)
    }

    /// Oldest unclaimed position, the only one that may be claimed
    pub fn peek_oldest(&self) -> Option<PositionId> {
        if self.first_active < self.next_id().0 {
            Some(PositionId(self.first_active))
        } else {
            None
        }
    }

    /// Check that `id` is claimable at `now` and return it
    pub fn check_claim(&self, id: PositionId, now: Timestamp, cooldown: u64) -> VaultResult<&Position> {
        if id.0 >= self.next_id().0 {
            return Err(VaultError::InvalidInput("unknown position"));
        }
        let oldest = self.peek_oldest();
        if oldest != Some(id) {
            return Err(VaultError::OutOfOrder {
                requested: id,
                oldest,
            });
        }
        let position = &self.positions[id.0 as usize];
        if !position.is_matured(now, cooldown) {
            return Err(VaultError::NotMatured {
                position: id,
                matures_at: position.matures_at(cooldown),
            });
        }
        Ok(position)
    }

    /// Flag the oldest position claimed and advance the active range
    pub fn mark_claimed(&mut self, id: PositionId) -> VaultResult<Position> {
        if self.peek_oldest() != Some(id) {
            return Err(VaultError::OutOfOrder {
                requested: id,
                oldest: self.peek_oldest(),
            });
        }
        let position = &mut self.positions[id.0 as usize];
        position.claimed = true;
        self.first_active += 1;
        Ok(position.clone())
    }

    /// Sum book value and accrued profit across the active range
    pub fn valuation(&self, now: Timestamp, cooldown: u64) -> Valuation {
        self.active().iter().fold(Valuation::default(), |acc, p| Valuation {
            total_book_value: add_u128(acc.total_book_value, p.book_value),
            total_accrued_profit: add_u128(acc.total_accrued_profit, p.accrued_profit(now, cooldown)),
        })
    }

    /// Empty when a restored ledger points `first_active` past the end
    pub fn active(&self) -> &[Position] {
        self.positions.get(self.first_active as usize..).unwrap_or(&[])
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(id.0 as usize)
    }

    pub fn all(&self) -> &[Position] {
        &self.positions
    }

    pub fn first_active_id(&self) -> PositionId {
        PositionId(self.first_active)
    }

    /// One past the last id ever assigned
    pub fn next_id(&self) -> PositionId {
        PositionId(self.positions.len() as u64)
    }

    pub fn active_count(&self) -> u64 {
        self.next_id().0 - self.first_active
    }
}
