pub mod access;
pub mod callback;
pub mod costs;
pub mod devnet;
pub mod errors;
pub mod events;
pub mod host;
pub mod instructions;
pub mod state;
pub mod storage;
pub mod types;
pub mod vrf;

pub use callback::{CallbackError, RandomnessConsumer};
pub use costs::{CostModel, Costs, StandardCostModel};
pub use errors::{BeaconError, HostError};
pub use events::BeaconEvent;
pub use host::{CallContext, Environment, Payment};
pub use state::{BeaconGlobals, BeaconState, RandomnessRequest};
pub use types::{Address, AppId, RequestId, Round, Seed};

use access::{Manager, Pausable};
use storage::BoxMap;
use vrf::{VrfProof, VrfPublicKey};

/// Randomness beacon contract.
///
/// Keeps a ledger of pending randomness requests and settles each one either
/// with a verified VRF proof over the target round's block seed, or by
/// cancellation once it is stale.
///
/// ## Request lifecycle
///
/// 1. **Create**: a requester application calls `create_request` with a
///    grouped payment covering [`get_costs`](Beacon::get_costs); a record is
///    stored under the next request id.
/// 2. **Complete**: the manager submits a proof over the block seed of the
///    target round; the callback is invoked, fees go to the submitter, the
///    storage deposit to the requester, and the record is deleted.
/// 3. **Cancel**: once `stale_request_timeout` rounds have passed after the
///    target round, anyone may unwind the request; a third-party canceller
///    earns a fixed incentive out of the refund.
///
/// Every entry point runs atomically on the host: an error leaves state,
/// balances and the event log untouched.
#[derive(Debug, Clone)]
pub struct Beacon {
    pub(crate) globals: BeaconGlobals,
    pub(crate) manager: Manager,
    pub(crate) pausable: Pausable,
    pub(crate) requests: BoxMap<RandomnessRequest>,
}

impl Beacon {
    /// One-time initializer. The sender becomes the manager.
    pub fn create_application(
        ctx: &CallContext,
        env: &mut dyn Environment,
        public_key: VrfPublicKey,
        max_pending_requests: u64,
        max_future_rounds: u64,
        stale_request_timeout: u64,
    ) -> Result<Self, BeaconError> {
        instructions::create_application::handler(
            ctx,
            env,
            public_key,
            max_pending_requests,
            max_future_rounds,
            stale_request_timeout,
        )
    }

    /// Submit a new randomness request for the block seed of `round`.
    ///
    /// Must be called by an application, grouped with `costs_payment` to the
    /// beacon's address covering at least `get_costs().total()`.
    pub fn create_request(
        &mut self,
        ctx: &CallContext,
        env: &mut dyn Environment,
        requester_address: Address,
        round: Round,
        costs_payment: &Payment,
    ) -> Result<RequestId, BeaconError> {
        instructions::create_request::handler(self, ctx, env, requester_address, round, costs_payment)
    }

    /// Fulfill a pending request with a 96-byte sr25519 VRF proof (manager only).
    pub fn complete_request(
        &mut self,
        ctx: &CallContext,
        env: &mut dyn Environment,
        request_id: RequestId,
        proof: &VrfProof,
    ) -> Result<(), BeaconError> {
        instructions::complete_request::handler(self, ctx, env, request_id, proof)
    }

    /// Unwind a stale request and refund its deposit.
    pub fn cancel_request(
        &mut self,
        ctx: &CallContext,
        env: &mut dyn Environment,
        request_id: RequestId,
    ) -> Result<(), BeaconError> {
        instructions::cancel_request::handler(self, ctx, env, request_id)
    }

    /// Minimum amounts a request must pre-pay. Read-only.
    pub fn get_costs(&self, env: &dyn Environment) -> Costs {
        instructions::get_costs::handler(env.cost_model())
    }

    pub fn transfer_manager(
        &mut self,
        ctx: &CallContext,
        env: &mut dyn Environment,
        new_manager: Address,
    ) -> Result<(), BeaconError> {
        instructions::admin::transfer_manager(self, ctx, env, new_manager)
    }

    pub fn pause(&mut self, ctx: &CallContext, env: &mut dyn Environment) -> Result<(), BeaconError> {
        instructions::admin::pause(self, ctx, env)
    }

    pub fn unpause(&mut self, ctx: &CallContext, env: &mut dyn Environment) -> Result<(), BeaconError> {
        instructions::admin::unpause(self, ctx, env)
    }

    /// Manager-only; the host swaps the program after this returns.
    pub fn update_application(&mut self, ctx: &CallContext) -> Result<(), BeaconError> {
        instructions::admin::update_application(self, ctx)
    }

    /// Manager-only; requires no pending requests. Returns the balance to the manager.
    pub fn delete_application(
        &mut self,
        ctx: &CallContext,
        env: &mut dyn Environment,
    ) -> Result<(), BeaconError> {
        instructions::admin::delete_application(self, ctx, env)
    }

    pub fn state(&self) -> BeaconState {
        BeaconState {
            manager: self.manager.address(),
            paused: self.pausable.is_paused(),
            globals: self.globals.clone(),
        }
    }

    pub fn globals(&self) -> &BeaconGlobals {
        &self.globals
    }

    pub fn request(&self, request_id: RequestId) -> Option<RandomnessRequest> {
        self.requests.get(request_id)
    }

    /// All live records, in id order.
    pub fn pending_requests(&self) -> Vec<RandomnessRequest> {
        self.requests.iter().map(|(_, r)| r).collect()
    }

    /// Storage deposit currently locked by request records.
    pub fn storage_mbr(&self, model: &dyn CostModel) -> u64 {
        self.requests.storage_mbr(model)
    }
}
