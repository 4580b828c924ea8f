//! Withdrawal queue
//!
//! Requests that idle cash cannot cover are escrowed and appended to a
//! head/tail-indexed ring. Request `id` lives at `entries[id - head]`, so
//! enqueue, cancel and dequeue never shift the backing storage. Cancelled
//! requests leave an empty slot in place; the head skips over them.
//!
//! ```plain
//!   head                                tail (next_id)
//!    │                                     │
//!    ▼                                     ▼
//!  ┌─────┬─────┬─────┬─────┬─────┐
//!  │ #4  │  ·  │ #6  │ #7  │  ·  │   · = cancelled
//!  └─────┴─────┴─────┴─────┴─────┘
//! ```
//!
//! Amounts owed are always computed from the escrowed shares at the price
//! passed to `fulfill`, so waiting requests share in profit and loss that
//! lands while they wait.

use std::collections::VecDeque;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::config::MAX_WITHDRAWALS_PER_BATCH;
use crate::error::{VaultError, VaultResult};
use crate::math::min_u128;
use crate::nav::SharePrice;
use crate::types::{AccountId, RequestId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: RequestId,
    pub owner: AccountId,
    pub escrowed_shares: u128,
    pub request_time: Timestamp,
    pub active: bool,
}

/// Result of a withdrawal request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalOutcome {
    /// Closed from idle cash with nothing queued
    Paid { assets: u128, shares_burned: u128 },
    /// Idle cash (possibly zero) paid now, the rest escrowed and queued
    Queued {
        request: RequestId,
        paid_now: u128,
        shares_burned: u128,
        escrowed_shares: u128,
    },
}

impl WithdrawalOutcome {
    pub fn paid_now(&self) -> u128 {
        match self {
            WithdrawalOutcome::Paid { assets, .. } => *assets,
            WithdrawalOutcome::Queued { paid_now, .. } => *paid_now,
        }
    }

    pub fn shares_burned(&self) -> u128 {
        match self {
            WithdrawalOutcome::Paid { shares_burned, .. } | WithdrawalOutcome::Queued { shares_burned, .. } => {
                *shares_burned
            }
        }
    }
}

/// One request paid (fully or partially) by a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub request: RequestId,
    pub owner: AccountId,
    pub assets: u128,
    pub shares_burned: u128,
    pub completed: bool,
}

/// Why a drain stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainStatus {
    /// No live requests remain
    Drained,
    /// Requests remain but the budget is spent
    FundsExhausted,
    /// The per-call batch limit was hit with budget left; call again
    BatchLimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillReport {
    pub payouts: ArrayVec<Payout, MAX_WITHDRAWALS_PER_BATCH>,
    pub assets_spent: u128,
    pub shares_burned: u128,
    pub status: DrainStatus,
}

impl FulfillReport {
    /// Nothing was waiting
    pub fn drained() -> Self {
        Self {
            payouts: ArrayVec::new(),
            assets_spent: 0,
            shares_burned: 0,
            status: DrainStatus::Drained,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQueue {
    entries: VecDeque<Option<WithdrawalRequest>>,
    /// Id of `entries[0]`
    head: u64,
    next_id: u64,
    live: usize,
    escrowed: u128,
}

impl WithdrawalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pay `shares` from idle cash if it covers them, otherwise pay what
    /// idle holds and queue the remainder.
    ///
    /// Shares burned for the instant part round up. When that already burns
    /// every requested share, the request closes as paid with `idle` and the
    /// owner forgoes `owed - idle`, which is less than one share's value.
    ///
    /// Only the queue is mutated here; the caller settles idle cash and the
    /// share book from the returned outcome.
    pub fn enqueue_or_pay(
        &mut self,
        owner: AccountId,
        shares: u128,
        price: &SharePrice,
        idle: u128,
        min_assets: u128,
        now: Timestamp,
    ) -> VaultResult<WithdrawalOutcome> {
        if shares == 0 {
            return Err(VaultError::InvalidInput("withdrawal of zero shares"));
        }
        let owed = price.assets_for(shares)?;
        if owed < min_assets || owed == 0 {
            return Err(VaultError::InvalidInput("withdrawal below minimum"));
        }
        if idle >= owed {
            return Ok(WithdrawalOutcome::Paid {
                assets: owed,
                shares_burned: shares,
            });
        }

        let burned = if idle > 0 {
            min_u128(price.shares_to_burn_for(idle)?, shares)
        } else {
            0
        };
        if burned == shares {
            return Ok(WithdrawalOutcome::Paid {
                assets: idle,
                shares_burned: shares,
            });
        }

        let escrowed_shares = shares - burned;
        let id = RequestId(self.next_id);
        self.entries.push_back(Some(WithdrawalRequest {
            id,
            owner,
            escrowed_shares,
            request_time: now,
            active: true,
        }));
        self.next_id += 1;
        self.live += 1;
        self.escrowed += escrowed_shares;

        Ok(WithdrawalOutcome::Queued {
            request: id,
            paid_now: idle,
            shares_burned: burned,
            escrowed_shares,
        })
    }

    /// Remove a live request owned by `caller` once it has waited `cooldown`.
    /// Returns the request with the shares to hand back.
    pub fn cancel(
        &mut self,
        id: RequestId,
        caller: &AccountId,
        now: Timestamp,
        cooldown: u64,
    ) -> VaultResult<WithdrawalRequest> {
        let index = self.index_of(id).ok_or(VaultError::InvalidInput("unknown or inactive request"))?;
        let request = self.entries[index]
            .as_ref()
            .ok_or(VaultError::InvalidInput("unknown or inactive request"))?;
        if request.owner != *caller {
            return Err(VaultError::Unauthorized);
        }
        let ready_at = request.request_time.saturating_add(cooldown);
        if now < ready_at {
            return Err(VaultError::TooSoon { request: id, ready_at });
        }

        let mut request = self.entries[index].take().ok_or(VaultError::InvalidState("request vanished"))?;
        request.active = false;
        self.live = self.live.saturating_sub(1);
        self.escrowed = self.escrowed.saturating_sub(request.escrowed_shares);
        self.skip_empty_head();
        Ok(request)
    }

    /// Pay queued requests oldest first out of `budget` at `price`.
    ///
    /// Visits at most `limit` entries (empty slots included) so the cost of
    /// one call is bounded however deep the queue is.
    pub fn fulfill(&mut self, budget: u128, price: &SharePrice, limit: usize) -> FulfillReport {
        let limit = limit.min(MAX_WITHDRAWALS_PER_BATCH);
        let mut report = FulfillReport::drained();
        let mut remaining = budget;
        let mut visited = 0usize;

        loop {
            if self.live == 0 {
                report.status = DrainStatus::Drained;
                break;
            }
            if visited >= limit {
                report.status = if remaining > 0 {
                    DrainStatus::BatchLimitReached
                } else {
                    DrainStatus::FundsExhausted
                };
                break;
            }
            let Some(front) = self.entries.front_mut() else {
                report.status = DrainStatus::Drained;
                break;
            };
            visited += 1;

            let Some(request) = front.as_mut() else {
                self.entries.pop_front();
                self.head += 1;
                continue;
            };

            let owed = price.assets_for(request.escrowed_shares).unwrap_or(price.total_assets);
            if owed <= remaining {
                let payout = Payout {
                    request: request.id,
                    owner: request.owner,
                    assets: owed,
                    shares_burned: request.escrowed_shares,
                    completed: true,
                };
                remaining -= owed;
                self.complete_front(&mut report, payout);
                continue;
            }
            if remaining == 0 {
                report.status = DrainStatus::FundsExhausted;
                break;
            }

            // Partial: the head takes whatever is left
            let burn = min_u128(
                price.shares_to_burn_for(remaining).unwrap_or(request.escrowed_shares),
                request.escrowed_shares,
            );
            let payout = Payout {
                request: request.id,
                owner: request.owner,
                assets: remaining,
                shares_burned: burn,
                completed: burn == request.escrowed_shares,
            };
            remaining = 0;
            if payout.completed {
                self.complete_front(&mut report, payout);
            } else {
                request.escrowed_shares -= burn;
                self.escrowed = self.escrowed.saturating_sub(burn);
                Self::record(&mut report, payout);
            }
            report.status = if self.live == 0 {
                DrainStatus::Drained
            } else {
                DrainStatus::FundsExhausted
            };
            break;
        }

        self.skip_empty_head();
        report.assets_spent = budget - remaining;
        report
    }

    fn complete_front(&mut self, report: &mut FulfillReport, payout: Payout) {
        self.entries.pop_front();
        self.head += 1;
        self.live = self.live.saturating_sub(1);
        self.escrowed = self.escrowed.saturating_sub(payout.shares_burned);
        Self::record(report, payout);
    }

    fn record(report: &mut FulfillReport, payout: Payout) {
        report.shares_burned += payout.shares_burned;
        report.payouts.push(payout);
    }

    fn skip_empty_head(&mut self) {
        while matches!(self.entries.front(), Some(None)) {
            self.entries.pop_front();
            self.head += 1;
        }
    }

    fn index_of(&self, id: RequestId) -> Option<usize> {
        if id.0 < self.head || id.0 >= self.next_id {
            return None;
        }
        usize::try_from(id.0 - self.head)
            .ok()
            .filter(|&i| i < self.entries.len())
    }

    pub fn get(&self, id: RequestId) -> Option<&WithdrawalRequest> {
        self.index_of(id).and_then(|i| self.entries.get(i)?.as_ref())
    }

    /// Live requests, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &WithdrawalRequest> {
        self.entries.iter().flatten()
    }

    /// Number of live requests
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Entries span exactly `[head, next_id)` and `live` counts the
    /// requests still in them
    pub fn is_well_formed(&self) -> bool {
        self.next_id.checked_sub(self.head) == Some(self.entries.len() as u64)
            && self.iter().count() == self.live
    }

    /// Shares escrowed across live requests
    pub fn escrowed_shares(&self) -> u128 {
        self.escrowed
    }

    pub fn head_id(&self) -> RequestId {
        RequestId(self.head)
    }

    pub fn tail_id(&self) -> RequestId {
        RequestId(self.next_id)
    }
}
