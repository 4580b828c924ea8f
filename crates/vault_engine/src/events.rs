//! Observable vault events
//!
//! Every state transition pushes an event here and writes a log line. Hosts
//! drain the buffer after each call and forward it wherever they publish.

use serde::Serialize;

use crate::config::ParamChange;
use crate::types::{AccountId, PositionId, RequestId, SlotId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    Deposited {
        owner: AccountId,
        assets: u128,
        shares: u128,
    },
    SlotProvisioned {
        slot: SlotId,
        account: AccountId,
    },
    ResourceAllocated {
        slot: SlotId,
        position: PositionId,
    },
    ResourceReleased {
        slot: SlotId,
        position: PositionId,
    },
    PositionOpened {
        position: PositionId,
        slot: SlotId,
        stake_amount: u128,
        book_value: u128,
        expected_value: u128,
    },
    PositionClaimed {
        position: PositionId,
        received: u128,
        realized_profit: u128,
    },
    FeeCollected {
        recipient: AccountId,
        amount: u128,
    },
    WithdrawalRequested {
        owner: AccountId,
        request: Option<RequestId>,
        shares: u128,
        paid_now: u128,
    },
    WithdrawalFulfilled {
        request: RequestId,
        owner: AccountId,
        assets: u128,
        shares_burned: u128,
        completed: bool,
    },
    WithdrawalCancelled {
        request: RequestId,
        owner: AccountId,
        shares_returned: u128,
    },
    PayoutDeferred {
        recipient: AccountId,
        amount: u128,
        reason: String,
    },
    PayableClaimed {
        recipient: AccountId,
        amount: u128,
    },
    ParameterChanged {
        change: ParamChange,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<VaultEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: VaultEvent) {
        log::debug!("event: {:?}", event);
        self.events.push(event);
    }

    /// Take everything emitted since the last drain
    pub fn drain(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending(&self) -> &[VaultEvent] {
        &self.events
    }
}
