//! In-memory chain used by the integration tests
//!
//! One `Chain` holds every token balance; the three collaborator handles
//! share it so swaps, claims and transfers all show up in the vault's
//! custody balances the way they would on a real ledger.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use vault_engine::external::{Custody, StakingAdapter, SwapRouter, UnwindPreview, UnwindTicket, UnwindTrade};
use vault_engine::pool::ResourceSlot;
use vault_engine::*;

pub const DAY: u64 = 24 * 60 * 60;
pub const WEEK: u64 = 7 * DAY;

pub const ADMIN: AccountId = AccountId::from_seed(1);
pub const KEEPER: AccountId = AccountId::from_seed(2);
pub const ROUTER: AccountId = AccountId::from_seed(3);
pub const FEES: AccountId = AccountId::from_seed(4);
pub const VAULT: AccountId = AccountId::from_seed(5);
pub const ALICE: AccountId = AccountId::from_seed(10);
pub const BOB: AccountId = AccountId::from_seed(11);
pub const CAROL: AccountId = AccountId::from_seed(12);

#[derive(Clone)]
pub struct Chain {
    pub assets: BTreeMap<AccountId, u128>,
    pub vault_stake: u128,
    /// Stake delivered per asset swapped, in bps
    pub swap_rate_bps: u128,
    /// Assets returned per stake unwound, in bps
    pub unwind_rate_bps: u128,
    /// Rate on the unwind ticket when it differs from the preview
    pub ticket_rate_bps: Option<u128>,
    /// Subtracted from every claim payout
    pub claim_shortfall: u128,
    pub unwind_eta: u64,
    pub now: Timestamp,
    pub claims: BTreeMap<u64, (AccountId, u128)>,
    pub pending_slots: BTreeSet<AccountId>,
    pub next_claim: u64,
    pub fail_collect: bool,
    pub fail_swap: bool,
    pub fail_request_unwind: bool,
    pub fail_claim: bool,
    pub rejecting: BTreeSet<AccountId>,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            assets: BTreeMap::new(),
            vault_stake: 0,
            swap_rate_bps: 10_000,
            unwind_rate_bps: 10_500,
            ticket_rate_bps: None,
            claim_shortfall: 0,
            unwind_eta: WEEK,
            now: 0,
            claims: BTreeMap::new(),
            pending_slots: BTreeSet::new(),
            next_claim: 0,
            fail_collect: false,
            fail_swap: false,
            fail_request_unwind: false,
            fail_claim: false,
            rejecting: BTreeSet::new(),
        }
    }
}

impl Chain {
    pub fn balance(&self, who: &AccountId) -> u128 {
        self.assets.get(who).copied().unwrap_or(0)
    }

    fn move_assets(&mut self, from: &AccountId, to: &AccountId, amount: u128) -> Result<(), ExternalError> {
        let have = self.balance(from);
        if have < amount {
            return Err(ExternalError::new("token", "insufficient balance"));
        }
        self.assets.insert(*from, have - amount);
        *self.assets.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

pub type SharedChain = Rc<RefCell<Chain>>;

pub struct SimCustody(pub SharedChain);
pub struct SimRouter(pub SharedChain);
pub struct SimStaking(pub SharedChain);

pub type SimVault = Vault<SimStaking, SimRouter, SimCustody>;

impl Custody for SimCustody {
    fn vault_account(&self) -> AccountId {
        VAULT
    }

    fn asset_balance(&self) -> u128 {
        self.0.borrow().balance(&VAULT)
    }

    fn stake_balance(&self) -> u128 {
        self.0.borrow().vault_stake
    }

    fn collect(&mut self, from: &AccountId, amount: u128) -> Result<(), ExternalError> {
        let mut chain = self.0.borrow_mut();
        if chain.fail_collect {
            return Err(ExternalError::new("custody", "collect reverted"));
        }
        chain.move_assets(from, &VAULT, amount)
    }

    fn transfer(&mut self, to: &AccountId, amount: u128) -> Result<(), ExternalError> {
        let mut chain = self.0.borrow_mut();
        if chain.rejecting.contains(to) {
            return Err(ExternalError::new("custody", "recipient rejected transfer"));
        }
        chain.move_assets(&VAULT, to, amount)
    }
}

impl SwapRouter for SimRouter {
    fn execute(&mut self, router: &AccountId, calldata: &[u8]) -> Result<(), ExternalError> {
        let mut chain = self.0.borrow_mut();
        if chain.fail_swap {
            return Err(ExternalError::new("router", "swap reverted"));
        }
        let bytes: [u8; 16] = calldata
            .try_into()
            .map_err(|_| ExternalError::new("router", "bad calldata"))?;
        let amount_in = u128::from_le_bytes(bytes);
        chain.move_assets(&VAULT, router, amount_in)?;
        let bought = amount_in * chain.swap_rate_bps / 10_000;
        chain.vault_stake += bought;
        Ok(())
    }
}

impl StakingAdapter for SimStaking {
    fn preview_unwind(&self, stake_amount: u128) -> Result<UnwindPreview, ExternalError> {
        let chain = self.0.borrow();
        Ok(UnwindPreview {
            expected_value: stake_amount * chain.unwind_rate_bps / 10_000,
            eta_seconds: chain.unwind_eta,
        })
    }

    fn request_unwind(&mut self, slot: &ResourceSlot, stake_amount: u128) -> Result<UnwindTicket, ExternalError> {
        let mut chain = self.0.borrow_mut();
        if chain.fail_request_unwind {
            return Err(ExternalError::new("staking", "unwind reverted"));
        }
        if !chain.pending_slots.insert(slot.account) {
            return Err(ExternalError::new("staking", "slot already unwinding"));
        }
        if chain.vault_stake < stake_amount {
            return Err(ExternalError::new("staking", "insufficient stake"));
        }
        chain.vault_stake -= stake_amount;
        let claim_id = chain.next_claim;
        chain.next_claim += 1;
        let rate = chain.ticket_rate_bps.unwrap_or(chain.unwind_rate_bps);
        let expected_value = stake_amount * rate / 10_000;
        chain.claims.insert(claim_id, (slot.account, expected_value));
        Ok(UnwindTicket {
            claim_id,
            maturity_time: chain.now + chain.unwind_eta,
            expected_value,
        })
    }

    fn claim(&mut self, slot: &ResourceSlot, claim_id: u64, receiver: &AccountId) -> Result<u128, ExternalError> {
        let mut chain = self.0.borrow_mut();
        if chain.fail_claim {
            return Err(ExternalError::new("staking", "claim reverted"));
        }
        let (account, value) = match chain.claims.get(&claim_id) {
            Some(claim) => *claim,
            None => return Err(ExternalError::new("staking", "unknown claim")),
        };
        if account != slot.account {
            return Err(ExternalError::new("staking", "claim belongs to another slot"));
        }
        chain.claims.remove(&claim_id);
        chain.pending_slots.remove(&account);
        let paid = value.saturating_sub(chain.claim_shortfall);
        *chain.assets.entry(*receiver).or_insert(0) += paid;
        Ok(paid)
    }
}

pub fn test_config() -> VaultConfig {
    VaultConfig {
        admin: ADMIN,
        fee_recipient: FEES,
        performance_fee_bps: 1_000,
        min_profit_bps: 0,
        cooldown_period: WEEK,
        max_active_positions: 50,
        min_withdrawal_assets: 1,
        unwind_callers: CallerPolicy::allow_list([KEEPER]),
        settle_callers: CallerPolicy::Anyone,
        allowed_routers: [ROUTER].into_iter().collect(),
        ..VaultConfig::default()
    }
}

/// Vault with `slots` provisioned slots and funded depositors
pub fn new_vault(config: VaultConfig, slots: u8) -> (SimVault, SharedChain) {
    let chain: SharedChain = Rc::new(RefCell::new(Chain::default()));
    {
        let mut c = chain.borrow_mut();
        for who in [ALICE, BOB, CAROL] {
            c.assets.insert(who, 1_000_000);
        }
    }
    let mut vault = Vault::new(
        config,
        SimStaking(chain.clone()),
        SimRouter(chain.clone()),
        SimCustody(chain.clone()),
    )
    .expect("valid config");
    for i in 0..slots {
        vault
            .provision_slot(ADMIN, AccountId::from_seed(100 + i))
            .expect("provision slot");
    }
    vault.drain_events();
    (vault, chain)
}

pub fn trade(amount: u128) -> UnwindTrade {
    UnwindTrade {
        router: ROUTER,
        calldata: amount.to_le_bytes().to_vec(),
        max_assets_in: amount,
        min_stake_out: 0,
    }
}

/// Run `op` the way a transactional host would: chain effects are
/// discarded when it fails
pub fn transactional<T>(chain: &SharedChain, op: impl FnOnce() -> VaultResult<T>) -> VaultResult<T> {
    let snapshot = chain.borrow().clone();
    let result = op();
    if result.is_err() {
        *chain.borrow_mut() = snapshot;
    }
    result
}

/// Open a position at `now` with the chain clock in step
pub fn open(vault: &mut SimVault, chain: &SharedChain, amount: u128, now: Timestamp) -> OpenReport {
    chain.borrow_mut().now = now;
    vault.begin_unwind(KEEPER, trade(amount), now).expect("open position")
}

pub fn assert_invariants(vault: &SimVault, now: Timestamp) {
    let report = check_invariants(vault.state(), now);
    assert!(report.all_hold(), "invariants violated: {:?}", report.violations());
}
