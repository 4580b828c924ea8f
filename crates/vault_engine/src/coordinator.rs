//! Vault coordinator
//!
//! `Vault` owns the state and the collaborators and exposes every
//! state-changing operation. Each operation follows the same shape:
//!
//! 1. validate everything that can be validated locally
//! 2. perform inbound calls (pull funds, swap, request unwind, claim) and
//!    measure their effect from custody balance deltas
//! 3. apply local effects
//! 4. perform outbound transfers
//!
//! A failure in steps 1-2 returns an error with local state untouched. An
//! outbound transfer that fails in step 4 is recorded as a payable owed to
//! the recipient instead of failing the operation, so a single rejecting
//! recipient cannot block settlement or the withdrawal queue.
//!
//! The engine cannot undo a collaborator call that already succeeded. The
//! host must run each operation as one transaction and roll back every
//! collaborator effect when it returns `Err`. `begin_unwind` depends on this
//! most: the swap and the irrevocable unwind request both happen before the
//! last profit and plausibility checks on the protocol's ticket.
//!
//! Taking `&mut self` for every mutation means no collaborator can call
//! back into the vault mid-operation.

use serde::Serialize;

use crate::config::{ParamChange, VaultConfig};
use crate::error::{VaultError, VaultResult};
use crate::events::{EventLog, VaultEvent};
use crate::external::{Custody, StakingAdapter, SwapRouter, UnwindTrade};
use crate::helpers::check_invariants;
use crate::ledger::{NewPosition, Valuation};
use crate::math::{add_u128, apply_bps, sub_u128};
use crate::nav::SharePrice;
use crate::queue::{FulfillReport, WithdrawalOutcome};
use crate::state::VaultState;
use crate::types::{AccountId, PositionId, RequestId, SlotId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReport {
    /// Assets that actually arrived in custody
    pub received: u128,
    pub shares: u128,
    /// Queue drain triggered by the new cash
    pub drain: FulfillReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpenReport {
    pub position: PositionId,
    pub slot: SlotId,
    pub book_value: u128,
    pub stake_amount: u128,
    pub expected_value: u128,
    pub maturity_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleReport {
    pub position: PositionId,
    pub received: u128,
    pub realized_profit: u128,
    pub fee: u128,
    pub drain: FulfillReport,
}

pub struct Vault<S, R, C> {
    state: VaultState,
    staking: S,
    router: R,
    custody: C,
    events: EventLog,
}

impl<S, R, C> Vault<S, R, C>
where
    S: StakingAdapter,
    R: SwapRouter,
    C: Custody,
{
    pub fn new(config: VaultConfig, staking: S, router: R, custody: C) -> VaultResult<Self> {
        config.validate()?;
        log::info!(
            "vault initialized: fee={}bps min_profit={}bps cooldown={}s max_active={}",
            config.performance_fee_bps,
            config.min_profit_bps,
            config.cooldown_period,
            config.max_active_positions
        );
        Ok(Self::assemble(VaultState::new(config), staking, router, custody))
    }

    /// Resume from a persisted state. A state that fails any invariant
    /// check at `now` is refused.
    pub fn restore(state: VaultState, staking: S, router: R, custody: C, now: Timestamp) -> VaultResult<Self> {
        state.config().validate()?;
        let report = check_invariants(&state, now);
        if !report.all_hold() {
            log::error!("refusing to restore vault state: {:?}", report.violations());
            return Err(VaultError::InvalidState("restored state violates invariants"));
        }
        Ok(Self::assemble(state, staking, router, custody))
    }

    fn assemble(state: VaultState, staking: S, router: R, custody: C) -> Self {
        Self {
            state,
            staking,
            router,
            custody,
            events: EventLog::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------------

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn config(&self) -> &VaultConfig {
        self.state.config()
    }

    pub fn staking(&self) -> &S {
        &self.staking
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn valuation(&self, now: Timestamp) -> Valuation {
        self.state.valuation(now)
    }

    pub fn total_assets(&self, now: Timestamp) -> u128 {
        self.state.total_assets(now)
    }

    pub fn share_price(&self, now: Timestamp) -> SharePrice {
        self.state.share_price(now)
    }

    pub fn preview_deposit(&self, assets: u128, now: Timestamp) -> VaultResult<u128> {
        self.share_price(now).shares_for_deposit(assets)
    }

    pub fn preview_redeem(&self, shares: u128, now: Timestamp) -> VaultResult<u128> {
        self.share_price(now).assets_for(shares)
    }

    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        self.events.drain()
    }

    // ---------------------------------------------------------------------
    // Depositor operations
    // ---------------------------------------------------------------------

    /// Pull `assets` from `caller` and mint shares at the pre-deposit price.
    pub fn deposit(&mut self, caller: AccountId, assets: u128, now: Timestamp) -> VaultResult<DepositReport> {
        if assets == 0 {
            return Err(VaultError::InvalidInput("deposit of zero assets"));
        }
        let price = self.state.share_price(now);
        if price.shares_for_deposit(assets)? == 0 {
            return Err(VaultError::InvalidInput("deposit too small to mint shares"));
        }

        let before = self.custody.asset_balance();
        self.custody.collect(&caller, assets)?;
        let received = sub_u128(self.custody.asset_balance(), before);
        let shares = price.shares_for_deposit(received)?;
        if shares == 0 {
            return Err(VaultError::InvalidInput("deposit too small to mint shares"));
        }

        self.state.shares.mint(&caller, shares)?;
        self.state.idle_balance = add_u128(self.state.idle_balance, received);
        log::info!("deposit: {} assets -> {} shares for {}", received, shares, caller);
        self.events.emit(VaultEvent::Deposited {
            owner: caller,
            assets: received,
            shares,
        });

        let drain = self.drain_queue(now)?;
        Ok(DepositReport {
            received,
            shares,
            drain,
        })
    }

    /// Redeem `shares`, instantly where idle cash allows and through the
    /// queue for the rest.
    pub fn request_withdrawal(
        &mut self,
        caller: AccountId,
        shares: u128,
        now: Timestamp,
    ) -> VaultResult<WithdrawalOutcome> {
        if shares == 0 {
            return Err(VaultError::InvalidInput("withdrawal of zero shares"));
        }
        if self.state.shares.balance_of(&caller) < shares {
            return Err(VaultError::InvalidInput("insufficient shares"));
        }

        let price = self.state.share_price(now);
        let min_assets = self.state.config.min_withdrawal_assets;
        // Idle is zero whenever requests already wait, so newcomers queue behind them
        let outcome = self
            .state
            .queue
            .enqueue_or_pay(caller, shares, &price, self.state.idle_balance, min_assets, now)?;

        self.state.shares.burn(&caller, outcome.shares_burned())?;
        let request = match outcome {
            WithdrawalOutcome::Paid { .. } => None,
            WithdrawalOutcome::Queued {
                request,
                escrowed_shares,
                ..
            } => {
                self.state.shares.escrow(&caller, escrowed_shares)?;
                Some(request)
            }
        };
        let paid_now = outcome.paid_now();
        self.state.idle_balance = sub_u128(self.state.idle_balance, paid_now);

        match request {
            Some(id) => log::info!("withdrawal: {} shares from {} queued as {} (paid now {})", shares, caller, id, paid_now),
            None => log::info!("withdrawal: {} shares from {} paid {} instantly", shares, caller, paid_now),
        }
        self.events.emit(VaultEvent::WithdrawalRequested {
            owner: caller,
            request,
            shares,
            paid_now,
        });

        self.pay_out(caller, paid_now);
        Ok(outcome)
    }

    /// Withdraw a queued request and hand its escrowed shares back.
    /// Returns the number of shares returned.
    pub fn cancel_withdrawal(&mut self, caller: AccountId, request: RequestId, now: Timestamp) -> VaultResult<u128> {
        let cancel_cooldown = self.state.config.cancel_cooldown_secs;
        // Escrow is checked first so a mismatch cannot leave the queue edited
        if let Some(queued) = self.state.queue.get(request) {
            if self.state.shares.escrowed() < queued.escrowed_shares {
                return Err(VaultError::InvalidState("escrow below queued shares"));
            }
        }
        let cancelled = self.state.queue.cancel(request, &caller, now, cancel_cooldown)?;
        self.state.shares.release_escrow(&cancelled.owner, cancelled.escrowed_shares)?;

        if self.state.queue.is_empty() && self.state.queue_reserve > 0 {
            self.state.idle_balance = add_u128(self.state.idle_balance, self.state.queue_reserve);
            self.state.queue_reserve = 0;
        }

        log::info!("withdrawal {} cancelled by {}", request, caller);
        self.events.emit(VaultEvent::WithdrawalCancelled {
            request,
            owner: cancelled.owner,
            shares_returned: cancelled.escrowed_shares,
        });
        Ok(cancelled.escrowed_shares)
    }

    /// Drain the queue with whatever cash is available. Anyone may call.
    pub fn process_withdrawals(&mut self, now: Timestamp) -> VaultResult<FulfillReport> {
        self.drain_queue(now)
    }

    /// Retry every deferred payout owed to `caller`
    pub fn claim_payable(&mut self, caller: AccountId) -> VaultResult<u128> {
        let amount = self.state.payable(&caller);
        if amount == 0 {
            return Err(VaultError::InvalidInput("nothing payable"));
        }
        self.custody.transfer(&caller, amount)?;
        self.state.payables.remove(&caller);

        log::info!("payable: {} claimed {}", caller, amount);
        self.events.emit(VaultEvent::PayableClaimed {
            recipient: caller,
            amount,
        });
        Ok(amount)
    }

    // ---------------------------------------------------------------------
    // Unwind lifecycle
    // ---------------------------------------------------------------------

    /// Swap idle cash into stake through a whitelisted router and start
    /// unwinding it on a free slot.
    pub fn begin_unwind(&mut self, caller: AccountId, trade: UnwindTrade, now: Timestamp) -> VaultResult<OpenReport> {
        let config = &self.state.config;
        if !config.unwind_callers.permits(&caller) {
            return Err(VaultError::Unauthorized);
        }
        if !config.allowed_routers.contains(&trade.router) {
            return Err(VaultError::Unauthorized);
        }
        if trade.max_assets_in == 0 {
            return Err(VaultError::InvalidInput("max assets in must be positive"));
        }
        if trade.max_assets_in > self.state.idle_balance {
            return Err(VaultError::InvalidInput("trade exceeds idle balance"));
        }
        let max_active = config.max_active_positions;
        let min_profit_bps = config.min_profit_bps;
        self.state.ledger.check_capacity(max_active)?;
        let slot_id = self.state.pool.peek_free()?;
        let slot = self
            .state
            .pool
            .get(slot_id)
            .cloned()
            .ok_or(VaultError::InvalidState("free slot missing"))?;

        // Swap and measure what actually moved
        let assets_before = self.custody.asset_balance();
        let stake_before = self.custody.stake_balance();
        self.router.execute(&trade.router, &trade.calldata)?;
        let book_value = sub_u128(assets_before, self.custody.asset_balance());
        let stake_amount = sub_u128(self.custody.stake_balance(), stake_before);

        if book_value == 0 {
            return Err(VaultError::InvalidInput("swap consumed no assets"));
        }
        if book_value > trade.max_assets_in {
            return Err(VaultError::SlippageExceeded {
                actual: book_value,
                bound: trade.max_assets_in,
            });
        }
        if stake_amount == 0 || stake_amount < trade.min_stake_out {
            return Err(VaultError::SlippageExceeded {
                actual: stake_amount,
                bound: trade.min_stake_out,
            });
        }

        let required = apply_bps(book_value, min_profit_bps).ok_or(VaultError::ArithmeticOverflow)?;
        let preview = self.staking.preview_unwind(stake_amount)?;
        check_profit(book_value, preview.expected_value, required)?;
        let mut new = NewPosition {
            stake_amount,
            book_value,
            expected_value: preview.expected_value,
            slot: slot_id,
            claim_id: 0,
            maturity_time: now.saturating_add(preview.eta_seconds),
        };
        // The unwind request cannot be taken back, so the quote must pass first
        self.state.ledger.check_open(&new, max_active)?;

        let ticket = self.staking.request_unwind(&slot, stake_amount)?;
        check_profit(book_value, ticket.expected_value, required)?;
        new.expected_value = ticket.expected_value;
        new.claim_id = ticket.claim_id;
        new.maturity_time = ticket.maturity_time;
        self.state.ledger.check_open(&new, max_active)?;

        // Effects
        let allocated = self.state.pool.allocate()?;
        if allocated != slot_id {
            return Err(VaultError::InvalidState("allocator diverged from peek"));
        }
        let position = self.state.ledger.open(new, max_active, now)?;
        self.state.idle_balance = sub_u128(self.state.idle_balance, book_value);

        log::info!(
            "unwind opened: {} on {} book={} stake={} expected={}",
            position,
            slot_id,
            book_value,
            stake_amount,
            ticket.expected_value
        );
        self.events.emit(VaultEvent::ResourceAllocated { slot: slot_id, position });
        self.events.emit(VaultEvent::PositionOpened {
            position,
            slot: slot_id,
            stake_amount,
            book_value,
            expected_value: ticket.expected_value,
        });

        Ok(OpenReport {
            position,
            slot: slot_id,
            book_value,
            stake_amount,
            expected_value: ticket.expected_value,
            maturity_time: ticket.maturity_time,
        })
    }

    /// Claim the oldest matured position, take the performance fee and
    /// route the proceeds to the queue first, then idle.
    pub fn settle_unwind(&mut self, caller: AccountId, id: PositionId, now: Timestamp) -> VaultResult<SettleReport> {
        if !self.state.config.settle_callers.permits(&caller) {
            return Err(VaultError::Unauthorized);
        }
        let cooldown = self.state.config.cooldown_period;
        let position = self.state.ledger.check_claim(id, now, cooldown)?.clone();
        let slot = self
            .state
            .pool
            .get(position.slot)
            .cloned()
            .ok_or(VaultError::InvalidState("position slot missing"))?;
        if !slot.busy {
            return Err(VaultError::InvalidState("position slot is not busy"));
        }

        let receiver = self.custody.vault_account();
        let before = self.custody.asset_balance();
        let reported = self.staking.claim(&slot, position.claim_id, &receiver)?;
        let received = sub_u128(self.custody.asset_balance(), before);
        if reported != received {
            log::debug!("claim for {} reported {} but {} arrived", id, reported, received);
        }

        let realized_profit = sub_u128(received, position.book_value);
        let fee_bps = self.state.config.performance_fee_bps;
        let fee = apply_bps(realized_profit, fee_bps).ok_or(VaultError::ArithmeticOverflow)?;
        let net = sub_u128(received, fee);

        // Ledger and slot first
        self.state.ledger.mark_claimed(id)?;
        self.state.pool.release(position.slot)?;
        log::info!(
            "unwind settled: {} received={} profit={} fee={}",
            id,
            received,
            realized_profit,
            fee
        );
        self.events.emit(VaultEvent::PositionClaimed {
            position: id,
            received,
            realized_profit,
        });
        self.events.emit(VaultEvent::ResourceReleased {
            slot: position.slot,
            position: id,
        });

        if fee > 0 {
            let recipient = self.state.config.fee_recipient;
            self.events.emit(VaultEvent::FeeCollected { recipient, amount: fee });
            self.pay_out(recipient, fee);
        }

        self.state.idle_balance = add_u128(self.state.idle_balance, net);
        let drain = self.drain_queue(now)?;

        Ok(SettleReport {
            position: id,
            received,
            realized_profit,
            fee,
            drain,
        })
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    pub fn provision_slot(&mut self, caller: AccountId, account: AccountId) -> VaultResult<SlotId> {
        self.require_admin(&caller)?;
        let slot = self.state.pool.provision(account)?;
        log::info!("slot provisioned: {} -> {}", slot, account);
        self.events.emit(VaultEvent::SlotProvisioned { slot, account });
        Ok(slot)
    }

    pub fn update_param(&mut self, caller: AccountId, change: ParamChange) -> VaultResult<()> {
        self.require_admin(&caller)?;
        self.state.config = change.applied_to(&self.state.config)?;
        log::info!("parameter changed: {:?}", change);
        self.events.emit(VaultEvent::ParameterChanged { change });
        Ok(())
    }

    fn require_admin(&self, caller: &AccountId) -> VaultResult<()> {
        if *caller != self.state.config.admin {
            return Err(VaultError::Unauthorized);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Pay the queue from idle plus reserve. Whatever the batch limit leaves
    /// unspent stays in the reserve while requests remain.
    fn drain_queue(&mut self, now: Timestamp) -> VaultResult<FulfillReport> {
        if self.state.queue.is_empty() {
            if self.state.queue_reserve > 0 {
                self.state.idle_balance = add_u128(self.state.idle_balance, self.state.queue_reserve);
                self.state.queue_reserve = 0;
            }
            return Ok(FulfillReport::drained());
        }

        let budget = add_u128(self.state.idle_balance, self.state.queue_reserve);
        let price = self.state.share_price(now);
        let limit = self.state.config.batch_limit();
        let report = self.state.queue.fulfill(budget, &price, limit);

        self.state.shares.burn_escrowed(report.shares_burned)?;
        let left = sub_u128(budget, report.assets_spent);
        if self.state.queue.is_empty() {
            self.state.idle_balance = left;
            self.state.queue_reserve = 0;
        } else {
            self.state.idle_balance = 0;
            self.state.queue_reserve = left;
        }

        if !report.payouts.is_empty() {
            log::info!(
                "queue drain: {} payouts, {} assets, status {:?}",
                report.payouts.len(),
                report.assets_spent,
                report.status
            );
        }
        for payout in &report.payouts {
            self.events.emit(VaultEvent::WithdrawalFulfilled {
                request: payout.request,
                owner: payout.owner,
                assets: payout.assets,
                shares_burned: payout.shares_burned,
                completed: payout.completed,
            });
            self.pay_out(payout.owner, payout.assets);
        }
        Ok(report)
    }

    /// Outbound transfer; a failure becomes a payable the recipient can claim
    fn pay_out(&mut self, to: AccountId, amount: u128) {
        if amount == 0 {
            return;
        }
        if let Err(err) = self.custody.transfer(&to, amount) {
            log::warn!("transfer of {} to {} deferred: {}", amount, to, err);
            self.state.add_payable(to, amount);
            self.events.emit(VaultEvent::PayoutDeferred {
                recipient: to,
                amount,
                reason: err.reason,
            });
        }
    }
}

fn check_profit(book_value: u128, expected_value: u128, required: u128) -> VaultResult<()> {
    let profit = sub_u128(expected_value, book_value);
    if expected_value < book_value || profit < required {
        return Err(VaultError::InsufficientProfit { profit, required });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallerPolicy;
    use crate::error::ExternalError;
    use crate::external::{UnwindPreview, UnwindTicket};
    use crate::pool::ResourceSlot;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    const WEEK: u64 = 7 * 24 * 3600;

    /// Token balances shared by the three mocks
    #[derive(Default)]
    struct Ledgers {
        vault: AccountId,
        assets: BTreeMap<AccountId, u128>,
        vault_stake: u128,
        /// Stake bought per asset unit, in percent
        stake_rate_pct: u128,
        /// Assets paid per stake unit at claim, in percent
        unwind_rate_pct: u128,
        pending: BTreeMap<u64, u128>,
        next_claim: u64,
        reject_transfers_to: Option<AccountId>,
    }

    type Shared = Rc<RefCell<Ledgers>>;

    struct MockCustody(Shared);
    struct MockRouter(Shared);
    struct MockStaking(Shared);

    impl Custody for MockCustody {
        fn vault_account(&self) -> AccountId {
            self.0.borrow().vault
        }
        fn asset_balance(&self) -> u128 {
            let l = self.0.borrow();
            l.assets.get(&l.vault).copied().unwrap_or(0)
        }
        fn stake_balance(&self) -> u128 {
            self.0.borrow().vault_stake
        }
        fn collect(&mut self, from: &AccountId, amount: u128) -> Result<(), ExternalError> {
            let mut l = self.0.borrow_mut();
            let bal = l.assets.get(from).copied().unwrap_or(0);
            if bal < amount {
                return Err(ExternalError::new("custody", "insufficient balance"));
            }
            l.assets.insert(*from, bal - amount);
            let vault = l.vault;
            *l.assets.entry(vault).or_insert(0) += amount;
            Ok(())
        }
        fn transfer(&mut self, to: &AccountId, amount: u128) -> Result<(), ExternalError> {
            let mut l = self.0.borrow_mut();
            if l.reject_transfers_to == Some(*to) {
                return Err(ExternalError::new("custody", "recipient rejected"));
            }
            let vault = l.vault;
            *l.assets.get_mut(&vault).unwrap() -= amount;
            *l.assets.entry(*to).or_insert(0) += amount;
            Ok(())
        }
    }

    impl SwapRouter for MockRouter {
        fn execute(&mut self, _router: &AccountId, calldata: &[u8]) -> Result<(), ExternalError> {
            let amount_in = u128::from_le_bytes(calldata.try_into().unwrap());
            let mut l = self.0.borrow_mut();
            let vault = l.vault;
            *l.assets.get_mut(&vault).unwrap() -= amount_in;
            let bought = amount_in * l.stake_rate_pct / 100;
            l.vault_stake += bought;
            Ok(())
        }
    }

    impl StakingAdapter for MockStaking {
        fn preview_unwind(&self, stake_amount: u128) -> Result<UnwindPreview, ExternalError> {
            Ok(UnwindPreview {
                expected_value: stake_amount * self.0.borrow().unwind_rate_pct / 100,
                eta_seconds: WEEK,
            })
        }
        fn request_unwind(&mut self, _slot: &ResourceSlot, stake_amount: u128) -> Result<UnwindTicket, ExternalError> {
            let mut l = self.0.borrow_mut();
            l.vault_stake -= stake_amount;
            let claim_id = l.next_claim;
            l.next_claim += 1;
            let expected_value = stake_amount * l.unwind_rate_pct / 100;
            l.pending.insert(claim_id, expected_value);
            Ok(UnwindTicket {
                claim_id,
                maturity_time: WEEK,
                expected_value,
            })
        }
        fn claim(&mut self, _slot: &ResourceSlot, claim_id: u64, receiver: &AccountId) -> Result<u128, ExternalError> {
            let mut l = self.0.borrow_mut();
            let amount = l
                .pending
                .remove(&claim_id)
                .ok_or_else(|| ExternalError::new("staking", "no such claim"))?;
            *l.assets.entry(*receiver).or_insert(0) += amount;
            Ok(amount)
        }
    }

    const ADMIN: AccountId = AccountId::from_seed(1);
    const KEEPER: AccountId = AccountId::from_seed(2);
    const ROUTER: AccountId = AccountId::from_seed(3);
    const FEES: AccountId = AccountId::from_seed(4);
    const ALICE: AccountId = AccountId::from_seed(10);
    const BOB: AccountId = AccountId::from_seed(11);

    fn setup() -> (Vault<MockStaking, MockRouter, MockCustody>, Shared) {
        let shared: Shared = Rc::new(RefCell::new(Ledgers {
            vault: AccountId::from_seed(99),
            stake_rate_pct: 100,
            unwind_rate_pct: 105,
            ..Default::default()
        }));
        {
            let mut l = shared.borrow_mut();
            l.assets.insert(ALICE, 10_000);
            l.assets.insert(BOB, 10_000);
        }
        let config = VaultConfig {
            admin: ADMIN,
            fee_recipient: FEES,
            cooldown_period: WEEK,
            min_withdrawal_assets: 1,
            unwind_callers: CallerPolicy::allow_list([KEEPER]),
            allowed_routers: [ROUTER].into_iter().collect(),
            ..VaultConfig::default()
        };
        let mut vault = Vault::new(
            config,
            MockStaking(shared.clone()),
            MockRouter(shared.clone()),
            MockCustody(shared.clone()),
        )
        .unwrap();
        vault.provision_slot(ADMIN, AccountId::from_seed(50)).unwrap();
        vault.provision_slot(ADMIN, AccountId::from_seed(51)).unwrap();
        (vault, shared)
    }

    fn trade(amount: u128) -> UnwindTrade {
        UnwindTrade {
            router: ROUTER,
            calldata: amount.to_le_bytes().to_vec(),
            max_assets_in: amount,
            min_stake_out: amount,
        }
    }

    #[test]
    fn test_deposit_mints_one_to_one_when_empty() {
        let (mut vault, shared) = setup();
        let report = vault.deposit(ALICE, 1_000, 0).unwrap();
        assert_eq!(report.shares, 1_000);
        assert_eq!(vault.state().idle_balance(), 1_000);
        assert_eq!(shared.borrow().assets[&ALICE], 9_000);
    }

    #[test]
    fn test_deposit_pull_failure_leaves_state() {
        let (mut vault, _) = setup();
        let before = vault.state().clone();
        let err = vault.deposit(ALICE, 50_000, 0).unwrap_err();
        assert!(matches!(err, VaultError::ExternalCallFailed(_)));
        assert_eq!(vault.state(), &before);
    }

    #[test]
    fn test_begin_unwind_requires_authorized_caller() {
        let (mut vault, _) = setup();
        vault.deposit(ALICE, 1_000, 0).unwrap();
        assert_eq!(vault.begin_unwind(BOB, trade(500), 0), Err(VaultError::Unauthorized));
    }

    #[test]
    fn test_begin_unwind_rejects_unknown_router() {
        let (mut vault, _) = setup();
        vault.deposit(ALICE, 1_000, 0).unwrap();
        let mut t = trade(500);
        t.router = AccountId::from_seed(77);
        assert_eq!(vault.begin_unwind(KEEPER, t, 0), Err(VaultError::Unauthorized));
    }

    #[test]
    fn test_begin_unwind_opens_position() {
        let (mut vault, _) = setup();
        vault.deposit(ALICE, 1_000, 0).unwrap();
        let report = vault.begin_unwind(KEEPER, trade(400), 0).unwrap();
        assert_eq!(report.position, PositionId(0));
        assert_eq!(report.book_value, 400);
        assert_eq!(report.expected_value, 420);
        assert_eq!(vault.state().idle_balance(), 600);
        assert_eq!(vault.state().pool().busy_count(), 1);
        // NAV unchanged at open
        assert_eq!(vault.total_assets(0), 1_000);
        assert_eq!(vault.total_assets(WEEK / 2), 1_010);
    }

    #[test]
    fn test_begin_unwind_insufficient_profit() {
        let (mut vault, shared) = setup();
        shared.borrow_mut().unwind_rate_pct = 100;
        vault.deposit(ALICE, 1_000, 0).unwrap();
        // 10 bps of 1_000 requires a profit of at least 1
        let err = vault.begin_unwind(KEEPER, trade(1_000), 0).unwrap_err();
        assert!(matches!(err, VaultError::InsufficientProfit { .. }));
        assert_eq!(vault.state().ledger().next_id(), PositionId(0));
        assert_eq!(vault.state().pool().busy_count(), 0);
    }

    #[test]
    fn test_begin_unwind_slippage() {
        let (mut vault, shared) = setup();
        shared.borrow_mut().stake_rate_pct = 90;
        vault.deposit(ALICE, 1_000, 0).unwrap();
        let err = vault.begin_unwind(KEEPER, trade(400), 0).unwrap_err();
        assert_eq!(
            err,
            VaultError::SlippageExceeded {
                actual: 360,
                bound: 400
            }
        );
    }

    #[test]
    fn test_settle_takes_fee_and_refills_idle() {
        let (mut vault, shared) = setup();
        vault.deposit(ALICE, 1_000, 0).unwrap();
        vault.begin_unwind(KEEPER, trade(400), 0).unwrap();

        assert!(matches!(
            vault.settle_unwind(KEEPER, PositionId(0), WEEK - 1),
            Err(VaultError::NotMatured { .. })
        ));

        let report = vault.settle_unwind(KEEPER, PositionId(0), WEEK).unwrap();
        assert_eq!(report.received, 420);
        assert_eq!(report.realized_profit, 20);
        assert_eq!(report.fee, 2);
        assert_eq!(vault.state().idle_balance(), 1_018);
        assert_eq!(shared.borrow().assets[&FEES], 2);
        assert_eq!(vault.state().pool().busy_count(), 0);
        assert_eq!(vault.state().first_active_position_id(), PositionId(1));
    }

    #[test]
    fn test_withdrawal_queues_then_drains_on_settle() {
        let (mut vault, shared) = setup();
        vault.deposit(ALICE, 1_000, 0).unwrap();
        vault.begin_unwind(KEEPER, trade(1_000), 0).unwrap();

        let outcome = vault.request_withdrawal(ALICE, 500, 1).unwrap();
        let request = match outcome {
            WithdrawalOutcome::Queued { request, paid_now, .. } => {
                assert_eq!(paid_now, 0);
                request
            }
            other => panic!("expected queued, got {:?}", other),
        };
        assert_eq!(vault.state().shares().escrowed(), 500);

        let report = vault.settle_unwind(KEEPER, PositionId(0), WEEK).unwrap();
        assert_eq!(report.drain.payouts.len(), 1);
        assert_eq!(report.drain.payouts[0].request, request);
        assert!(vault.state().queue().is_empty());
        assert_eq!(vault.state().shares().escrowed(), 0);
        assert!(shared.borrow().assets[&ALICE] > 9_000);
        assert!(check_invariants_hold(&vault, WEEK));
    }

    #[test]
    fn test_failed_payout_becomes_payable() {
        let (mut vault, shared) = setup();
        vault.deposit(ALICE, 1_000, 0).unwrap();
        shared.borrow_mut().reject_transfers_to = Some(ALICE);

        let outcome = vault.request_withdrawal(ALICE, 100, 0).unwrap();
        assert_eq!(outcome.paid_now(), 100);
        assert_eq!(vault.state().payable(&ALICE), 100);
        assert_eq!(vault.state().idle_balance(), 900);

        assert!(vault.claim_payable(ALICE).is_err());
        assert_eq!(vault.state().payable(&ALICE), 100);

        shared.borrow_mut().reject_transfers_to = None;
        assert_eq!(vault.claim_payable(ALICE), Ok(100));
        assert_eq!(vault.state().payable(&ALICE), 0);
    }

    #[test]
    fn test_admin_only_operations() {
        let (mut vault, _) = setup();
        assert_eq!(
            vault.provision_slot(BOB, AccountId::from_seed(60)),
            Err(VaultError::Unauthorized)
        );
        assert_eq!(
            vault.update_param(BOB, ParamChange::MinProfitBps(0)),
            Err(VaultError::Unauthorized)
        );
        vault.update_param(ADMIN, ParamChange::MinProfitBps(0)).unwrap();
        assert_eq!(vault.state().min_profit_bps(), 0);
    }

    #[test]
    fn test_events_recorded() {
        let (mut vault, _) = setup();
        vault.drain_events();
        vault.deposit(ALICE, 1_000, 0).unwrap();
        let events = vault.drain_events();
        assert!(matches!(events[0], VaultEvent::Deposited { shares: 1_000, .. }));
    }

    fn check_invariants_hold(vault: &Vault<MockStaking, MockRouter, MockCustody>, now: Timestamp) -> bool {
        crate::helpers::check_invariants(vault.state(), now).all_hold()
    }
}
