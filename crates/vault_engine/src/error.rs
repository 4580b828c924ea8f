//! Engine error taxonomy
//!
//! Every variant aborts the operation that produced it with no local state
//! mutated. Batch-limited queue progress is not an error; it is reported as
//! [`crate::queue::DrainStatus::BatchLimitReached`].

use crate::types::{PositionId, RequestId, Timestamp};

pub type VaultResult<T> = Result<T, VaultError>;

/// Which bounded resource ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Every pool slot has an in-flight unwind
    Slots,
    /// The ledger already holds `max_active_positions` positions
    PositionCapacity,
}

/// Failure reported by a collaborator (staking adapter, swap router, custody)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{collaborator}: {reason}")]
pub struct ExternalError {
    pub collaborator: &'static str,
    pub reason: String,
}

impl ExternalError {
    pub fn new<S: Into<String>>(collaborator: &'static str, reason: S) -> Self {
        Self {
            collaborator,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("resource exhausted: {resource:?}")]
    ResourceExhausted { resource: Resource },

    #[error("{position} matures at {matures_at}")]
    NotMatured {
        position: PositionId,
        matures_at: Timestamp,
    },

    #[error("{requested} is not the oldest active position ({oldest:?})")]
    OutOfOrder {
        requested: PositionId,
        oldest: Option<PositionId>,
    },

    #[error("profit {profit} below required {required}")]
    InsufficientProfit { profit: u128, required: u128 },

    #[error("slippage: got {actual}, bound {bound}")]
    SlippageExceeded { actual: u128, bound: u128 },

    #[error("external call failed: {0}")]
    ExternalCallFailed(#[from] ExternalError),

    #[error("unauthorized caller")]
    Unauthorized,

    #[error("{request} cannot be cancelled before {ready_at}")]
    TooSoon {
        request: RequestId,
        ready_at: Timestamp,
    },

    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

impl VaultError {
    pub fn slots_exhausted() -> Self {
        VaultError::ResourceExhausted {
            resource: Resource::Slots,
        }
    }
}
