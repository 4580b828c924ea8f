//! Invariant checking helpers

use serde::Serialize;

use crate::state::VaultState;
use crate::types::Timestamp;

/// Active positions are exactly `[first_active, next_id)`, none claimed
pub fn active_range_contiguous(s: &VaultState) -> bool {
    let ledger = s.ledger();
    if ledger.first_active_id() > ledger.next_id() {
        return false;
    }
    let all = ledger.all();
    let first = ledger.first_active_id().0 as usize;
    all.iter().enumerate().all(|(i, p)| p.id.0 as usize == i && p.claimed == (i < first))
}

/// Each active position accrues within `[0, expected - book]`
pub fn accrual_bounded(s: &VaultState, now: Timestamp) -> bool {
    let cooldown = s.cooldown_period();
    s.ledger().active().iter().all(|p| {
        p.expected_value >= p.book_value && p.accrued_profit(now, cooldown) <= p.max_profit()
    })
}

/// Busy slots match active positions one to one
pub fn busy_matches_active(s: &VaultState) -> bool {
    let active = s.ledger().active();
    if s.pool().busy_count() as u64 != active.len() as u64 {
        return false;
    }
    let busy_flagged = s.pool().slots().iter().filter(|slot| slot.busy).count();
    if busy_flagged != active.len() {
        return false;
    }
    // No slot referenced twice, every referenced slot busy
    let mut seen = std::collections::BTreeSet::new();
    active.iter().all(|p| {
        seen.insert(p.slot) && s.pool().get(p.slot).map_or(false, |slot| slot.busy)
    })
}

/// Idle cash never sits next to a waiting request
pub fn idle_or_queue_empty(s: &VaultState) -> bool {
    s.idle_balance() == 0 || s.queue().is_empty()
}

/// Reserve only exists while requests wait
pub fn reserve_only_with_queue(s: &VaultState) -> bool {
    s.queue_reserve() == 0 || !s.queue().is_empty()
}

/// Escrow tracked by the queue matches the share book
pub fn escrow_consistent(s: &VaultState) -> bool {
    let queued: u128 = s.queue().iter().map(|r| r.escrowed_shares).sum();
    queued == s.queue().escrowed_shares() && queued == s.shares().escrowed()
}

/// Pool, queue and share book counters agree with their contents
pub fn books_well_formed(s: &VaultState) -> bool {
    s.pool().is_well_formed() && s.queue().is_well_formed() && s.shares().is_well_formed()
}

/// Named result of every check, for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvariantReport {
    pub active_range_contiguous: bool,
    pub accrual_bounded: bool,
    pub busy_matches_active: bool,
    pub idle_or_queue_empty: bool,
    pub reserve_only_with_queue: bool,
    pub escrow_consistent: bool,
    pub books_well_formed: bool,
}

impl InvariantReport {
    pub fn all_hold(&self) -> bool {
        self.active_range_contiguous
            && self.accrual_bounded
            && self.busy_matches_active
            && self.idle_or_queue_empty
            && self.reserve_only_with_queue
            && self.escrow_consistent
            && self.books_well_formed
    }

    /// Names of the checks that failed
    pub fn violations(&self) -> Vec<&'static str> {
        [
            ("active_range_contiguous", self.active_range_contiguous),
            ("accrual_bounded", self.accrual_bounded),
            ("busy_matches_active", self.busy_matches_active),
            ("idle_or_queue_empty", self.idle_or_queue_empty),
            ("reserve_only_with_queue", self.reserve_only_with_queue),
            ("escrow_consistent", self.escrow_consistent),
            ("books_well_formed", self.books_well_formed),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Run every check. Checks that walk the active range are reported failed
/// without running when the range itself is broken.
pub fn check_invariants(s: &VaultState, now: Timestamp) -> InvariantReport {
    let contiguous = active_range_contiguous(s);
    InvariantReport {
        active_range_contiguous: contiguous,
        accrual_bounded: contiguous && accrual_bounded(s, now),
        busy_matches_active: contiguous && busy_matches_active(s),
        idle_or_queue_empty: idle_or_queue_empty(s),
        reserve_only_with_queue: reserve_only_with_queue(s),
        escrow_consistent: escrow_consistent(s),
        books_well_formed: books_well_formed(s),
    }
}
