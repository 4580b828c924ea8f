//! Collaborator interfaces
//!
//! The engine never trusts amounts reported by these collaborators when it
//! can measure them: swap input/output and claim proceeds are taken from
//! custody balance deltas around the call.
//!
//! Implementations act on the outside world immediately and the vault has no
//! way to take an effect back. When a vault operation returns `Err` after
//! one of these calls succeeded, the host is expected to discard the whole
//! transaction, collaborator effects included.

use crate::error::ExternalError;
use crate::pool::ResourceSlot;
use crate::types::{AccountId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindPreview {
    pub expected_value: u128,
    pub eta_seconds: u64,
}

/// Returned by the staking protocol when an unwind is initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindTicket {
    pub claim_id: u64,
    pub maturity_time: Timestamp,
    pub expected_value: u128,
}

/// External staking protocol. Each slot account may hold one pending unwind.
pub trait StakingAdapter {
    fn preview_unwind(&self, stake_amount: u128) -> Result<UnwindPreview, ExternalError>;

    /// Irrevocably commit `stake_amount` to an unwind through `slot`.
    ///
    /// `begin_unwind` can still fail after this returns (the ticket may
    /// quote less than the preview did). Only a host rollback then frees the
    /// slot account on the protocol side.
    fn request_unwind(&mut self, slot: &ResourceSlot, stake_amount: u128) -> Result<UnwindTicket, ExternalError>;

    /// Finalize a matured unwind, sending proceeds to `receiver`.
    /// The returned amount is informational only.
    fn claim(&mut self, slot: &ResourceSlot, claim_id: u64, receiver: &AccountId) -> Result<u128, ExternalError>;
}

/// Swap venue executing caller-supplied calldata. The swap is checked
/// against the trade bounds only after it ran, so a rejected trade relies on
/// the host rolling it back.
pub trait SwapRouter {
    fn execute(&mut self, router: &AccountId, calldata: &[u8]) -> Result<(), ExternalError>;
}

/// The vault's own token accounts. `collect` must be rolled back with the
/// rest of a failed operation.
pub trait Custody {
    fn vault_account(&self) -> AccountId;

    fn asset_balance(&self) -> u128;

    fn stake_balance(&self) -> u128;

    /// Pull `amount` of the asset from `from` into the vault
    fn collect(&mut self, from: &AccountId, amount: u128) -> Result<(), ExternalError>;

    /// Send `amount` of the asset from the vault to `to`
    fn transfer(&mut self, to: &AccountId, amount: u128) -> Result<(), ExternalError>;
}

/// A candidate trade submitted to `begin_unwind`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindTrade {
    pub router: AccountId,
    pub calldata: Vec<u8>,
    /// Most assets the swap may consume
    pub max_assets_in: u128,
    /// Fewest stake tokens the swap must deliver
    pub min_stake_out: u128,
}
