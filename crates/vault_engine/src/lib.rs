//! Unwind vault engine
//! Pooled deposits buy a staked token at a discount, unwind it through a
//! fixed pool of staking slots, and pay withdrawals from a FIFO queue.
//! Host-agnostic: collaborators are traits, time is passed in, no panics.

#![forbid(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod external;
pub mod helpers;
pub mod ledger;
pub mod math;
pub mod nav;
pub mod pool;
pub mod queue;
pub mod shares;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::{CallerPolicy, ParamChange, VaultConfig};
pub use coordinator::{DepositReport, OpenReport, SettleReport, Vault};
pub use error::{ExternalError, Resource, VaultError, VaultResult};
pub use events::VaultEvent;
pub use external::{Custody, StakingAdapter, SwapRouter, UnwindPreview, UnwindTicket, UnwindTrade};
pub use helpers::{check_invariants, InvariantReport};
pub use ledger::{Position, Valuation};
pub use nav::SharePrice;
pub use queue::{DrainStatus, FulfillReport, Payout, WithdrawalOutcome, WithdrawalRequest};
pub use state::VaultState;
pub use types::{AccountId, PositionId, RequestId, SlotId, Timestamp};
