//! Seam between the contract and the ledger it runs on.
//!
//! A call executes atomically: if any step returns an error the host
//! discards every effect requested through [`Environment`] during that call.

use serde::{Deserialize, Serialize};

use crate::costs::CostModel;
use crate::errors::HostError;
use crate::events::BeaconEvent;
use crate::types::{Address, AppId, RequestId, Round, Seed};
use crate::vrf::VrfOutput;

/// Who submitted the outer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Account that signed (and pays the fees of) the transaction.
    pub sender: Address,
    /// Calling application, `None` when a plain account calls directly.
    pub caller_app: Option<AppId>,
}

impl CallContext {
    pub fn account(sender: Address) -> Self {
        Self {
            sender,
            caller_app: None,
        }
    }

    pub fn application(app: AppId, app_address: Address) -> Self {
        Self {
            sender: app_address,
            caller_app: Some(app),
        }
    }
}

/// A payment transaction grouped with an application call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
}

/// Effects and queries the contract may use during a call.
pub trait Environment {
    /// Last committed round.
    fn current_round(&self) -> Round;

    /// Block seed of `round`; only available inside the lookback window.
    fn block_seed(&self, round: Round) -> Result<Seed, HostError>;

    /// How many rounds back block seeds remain queryable.
    fn seed_lookback(&self) -> u64;

    /// Account of the executing application.
    fn application_address(&self) -> Address;

    fn cost_model(&self) -> &dyn CostModel;

    /// Raise the opcode budget of this call to at least `opcodes`.
    fn ensure_budget(&mut self, opcodes: u64) -> Result<(), HostError>;

    /// Inner payment from the application account.
    fn pay(&mut self, receiver: Address, amount: u64) -> Result<(), HostError>;

    /// Inner call of `fulfillRandomness` on the requester application.
    fn invoke_callback(
        &mut self,
        app: AppId,
        request_id: RequestId,
        requester: Address,
        output: &VrfOutput,
    ) -> Result<(), HostError>;

    /// Send the whole application balance to `receiver` and delete the application.
    fn close_application(&mut self, receiver: Address) -> Result<(), HostError>;

    fn emit(&mut self, event: BeaconEvent);
}
