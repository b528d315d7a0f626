//! In-memory host ledger.
//!
//! Executes beacon calls with the host's guarantees: every call is atomic
//! (group payments, contract effects, fees and the application minimum
//! balance check commit together or not at all) and calls are applied
//! serially. Block seeds are `sha256(genesis || round)` and stay queryable
//! for `seed_lookback` rounds.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::callback::RandomnessConsumer;
use crate::costs::{CostModel, Costs, StandardCostModel};
use crate::errors::{BeaconError, HostError};
use crate::events::BeaconEvent;
use crate::host::{CallContext, Environment, Payment};
use crate::state::RandomnessRequest;
use crate::types::{Address, AppId, RequestId, Round, Seed};
use crate::vrf::{VrfOutput, VrfProof, VrfPublicKey};
use crate::Beacon;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevnetConfig {
    pub genesis: [u8; 32],
    pub start_round: Round,
    /// Rounds a block seed stays queryable.
    pub seed_lookback: u64,
    pub costs: StandardCostModel,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            genesis: Sha256::digest(b"beacon-devnet-genesis").into(),
            start_round: 1,
            seed_lookback: 1_000,
            costs: StandardCostModel::default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DevnetError {
    #[error("application {0} does not exist")]
    AppNotFound(AppId),
    #[error("application account {address} would hold {balance}, below its minimum of {required}")]
    BelowMinimumBalance {
        address: Address,
        balance: u64,
        required: u64,
    },
    /// A grouped payment or application context not signed by the sender.
    #[error("transaction sender {sender} cannot authorize {claimed}")]
    UnauthorizedSender { sender: Address, claimed: Address },
    #[error(transparent)]
    Beacon(#[from] BeaconError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl DevnetError {
    /// Stable failure name, matching [`BeaconError::code`] for contract failures.
    pub fn code(&self) -> &'static str {
        match self {
            DevnetError::AppNotFound(_) => "ApplicationNotFound",
            DevnetError::BelowMinimumBalance { .. } => "BelowMinimumBalance",
            DevnetError::UnauthorizedSender { .. } => "UnauthorizedSender",
            DevnetError::Beacon(e) => e.code(),
            DevnetError::Host(e) => BeaconError::Host(e.clone()).code(),
        }
    }
}

/// An event together with where and when it was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub round: Round,
    pub app_id: AppId,
    #[serde(flatten)]
    pub event: BeaconEvent,
}

/// Account address of an application: `sha256("appID" || id_be)`.
pub fn application_address(app: AppId) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"appID");
    hasher.update(app.0.to_be_bytes());
    Address(hasher.finalize().into())
}

fn seed_for(genesis: &[u8; 32], round: Round) -> Seed {
    let mut hasher = Sha256::new();
    hasher.update(genesis);
    hasher.update(round.to_be_bytes());
    Seed(hasher.finalize().into())
}

fn debit(balances: &mut BTreeMap<Address, u64>, address: Address, amount: u64) -> Result<(), HostError> {
    let balance = balances.get(&address).copied().unwrap_or(0);
    if balance < amount {
        return Err(HostError::InsufficientFunds {
            address,
            balance,
            required: amount,
        });
    }
    balances.insert(address, balance - amount);
    Ok(())
}

fn credit(balances: &mut BTreeMap<Address, u64>, address: Address, amount: u64) {
    *balances.entry(address).or_insert(0) += amount;
}

pub struct Devnet {
    config: DevnetConfig,
    round: Round,
    balances: BTreeMap<Address, u64>,
    beacons: BTreeMap<AppId, Beacon>,
    consumers: BTreeMap<AppId, Box<dyn RandomnessConsumer>>,
    events: Vec<LoggedEvent>,
    next_app_id: u64,
}

impl Default for Devnet {
    fn default() -> Self {
        Self::new(DevnetConfig::default())
    }
}

impl Devnet {
    pub fn new(config: DevnetConfig) -> Self {
        Self {
            round: config.start_round,
            config,
            balances: BTreeMap::new(),
            beacons: BTreeMap::new(),
            consumers: BTreeMap::new(),
            events: Vec::new(),
            next_app_id: 1,
        }
    }

    /// Last committed round.
    pub fn round(&self) -> Round {
        self.round
    }

    pub fn advance_rounds(&mut self, rounds: u64) -> Round {
        self.round = self.round.saturating_add(rounds);
        debug!(round = self.round, "round advanced");
        self.round
    }

    pub fn seed_lookback(&self) -> u64 {
        self.config.seed_lookback
    }

    pub fn costs(&self) -> &StandardCostModel {
        &self.config.costs
    }

    pub fn block_seed(&self, round: Round) -> Result<Seed, HostError> {
        if round > self.round || self.round - round > self.config.seed_lookback {
            return Err(HostError::SeedUnavailable(round));
        }
        Ok(seed_for(&self.config.genesis, round))
    }

    /// Faucet: mint `amount` into `address`.
    pub fn fund(&mut self, address: Address, amount: u64) {
        credit(&mut self.balances, address, amount);
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn beacon(&self, app: AppId) -> Option<&Beacon> {
        self.beacons.get(&app)
    }

    /// Read path used by off-chain workers: every live record of a beacon.
    pub fn pending_requests(&self, app: AppId) -> Result<Vec<RandomnessRequest>, DevnetError> {
        self.beacon(app)
            .map(Beacon::pending_requests)
            .ok_or(DevnetError::AppNotFound(app))
    }

    /// Downcast a deployed consumer application for inspection.
    pub fn consumer<T: 'static>(&self, app: AppId) -> Option<&T> {
        self.consumers.get(&app)?.as_any().downcast_ref::<T>()
    }

    pub fn events(&self) -> &[LoggedEvent] {
        &self.events
    }

    /// Create a beacon; `creator` becomes its manager and funds the account minimum.
    pub fn deploy_beacon(
        &mut self,
        creator: Address,
        public_key: VrfPublicKey,
        max_pending_requests: u64,
        max_future_rounds: u64,
        stale_request_timeout: u64,
    ) -> Result<AppId, DevnetError> {
        let app_id = AppId(self.next_app_id);
        let ctx = CallContext::account(creator);
        let mut txn = self.begin(app_id);

        let beacon = Beacon::create_application(
            &ctx,
            &mut txn,
            public_key,
            max_pending_requests,
            max_future_rounds,
            stale_request_timeout,
        )?;

        let min_balance = txn.costs.account_min_balance;
        txn.transfer(creator, txn.app_address, min_balance)?;
        // application create + funding payment
        txn.charge(creator, 2 * txn.costs.min_fee)?;

        let effects = txn.finish();
        self.next_app_id += 1;
        self.commit(app_id, Some(beacon), effects);

        info!(app = %app_id, address = %application_address(app_id), "beacon deployed");
        Ok(app_id)
    }

    /// Register a requester application and fund its account with `funding`.
    pub fn deploy_consumer(
        &mut self,
        creator: Address,
        consumer: Box<dyn RandomnessConsumer>,
        funding: u64,
    ) -> Result<AppId, DevnetError> {
        let app_id = AppId(self.next_app_id);
        let fee = 2 * self.config.costs.min_fee;
        let mut balances = self.balances.clone();
        debit(&mut balances, creator, funding + fee)?;
        credit(&mut balances, application_address(app_id), funding);

        self.balances = balances;
        self.consumers.insert(app_id, consumer);
        self.next_app_id += 1;

        info!(app = %app_id, "consumer deployed");
        Ok(app_id)
    }

    pub fn get_costs(&self, app: AppId) -> Result<Costs, DevnetError> {
        let beacon = self.beacon(app).ok_or(DevnetError::AppNotFound(app))?;
        Ok(beacon.get_costs(&self.begin(app)))
    }

    pub fn create_request(
        &mut self,
        app: AppId,
        ctx: CallContext,
        requester_address: Address,
        round: Round,
        costs_payment: Payment,
    ) -> Result<RequestId, DevnetError> {
        self.execute(app, &ctx, &[costs_payment], |beacon, env| {
            beacon.create_request(&ctx, env, requester_address, round, &costs_payment)
        })
    }

    pub fn complete_request(
        &mut self,
        app: AppId,
        sender: Address,
        request_id: RequestId,
        proof: &VrfProof,
    ) -> Result<(), DevnetError> {
        let ctx = CallContext::account(sender);
        self.execute(app, &ctx, &[], |beacon, env| {
            beacon.complete_request(&ctx, env, request_id, proof)
        })
    }

    pub fn cancel_request(
        &mut self,
        app: AppId,
        sender: Address,
        request_id: RequestId,
    ) -> Result<(), DevnetError> {
        let ctx = CallContext::account(sender);
        self.execute(app, &ctx, &[], |beacon, env| {
            beacon.cancel_request(&ctx, env, request_id)
        })
    }

    pub fn transfer_manager(
        &mut self,
        app: AppId,
        sender: Address,
        new_manager: Address,
    ) -> Result<(), DevnetError> {
        let ctx = CallContext::account(sender);
        self.execute(app, &ctx, &[], |beacon, env| {
            beacon.transfer_manager(&ctx, env, new_manager)
        })
    }

    pub fn pause(&mut self, app: AppId, sender: Address) -> Result<(), DevnetError> {
        let ctx = CallContext::account(sender);
        self.execute(app, &ctx, &[], |beacon, env| beacon.pause(&ctx, env))
    }

    pub fn unpause(&mut self, app: AppId, sender: Address) -> Result<(), DevnetError> {
        let ctx = CallContext::account(sender);
        self.execute(app, &ctx, &[], |beacon, env| beacon.unpause(&ctx, env))
    }

    pub fn update_application(&mut self, app: AppId, sender: Address) -> Result<(), DevnetError> {
        let ctx = CallContext::account(sender);
        self.execute(app, &ctx, &[], |beacon, _| beacon.update_application(&ctx))
    }

    pub fn delete_application(&mut self, app: AppId, sender: Address) -> Result<(), DevnetError> {
        let ctx = CallContext::account(sender);
        self.execute(app, &ctx, &[], |beacon, env| beacon.delete_application(&ctx, env))?;
        info!(app = %app, "beacon deleted");
        Ok(())
    }

    fn begin(&self, app_id: AppId) -> Txn<'_> {
        Txn {
            app_address: application_address(app_id),
            round: self.round,
            genesis: &self.config.genesis,
            seed_lookback: self.config.seed_lookback,
            costs: &self.config.costs,
            consumers: &self.consumers,
            balances: self.balances.clone(),
            staged_consumers: BTreeMap::new(),
            events: Vec::new(),
            inner_calls: 0,
            budget: self.config.costs.app_call_budget,
            closed: false,
        }
    }

    /// Run one application call against a staged copy of the ledger.
    fn execute<T>(
        &mut self,
        app_id: AppId,
        ctx: &CallContext,
        group: &[Payment],
        call: impl FnOnce(&mut Beacon, &mut dyn Environment) -> Result<T, BeaconError>,
    ) -> Result<T, DevnetError> {
        let mut beacon = self
            .beacons
            .get(&app_id)
            .cloned()
            .ok_or(DevnetError::AppNotFound(app_id))?;
        if let Some(caller) = ctx.caller_app {
            let claimed = application_address(caller);
            if claimed != ctx.sender {
                return Err(DevnetError::UnauthorizedSender {
                    sender: ctx.sender,
                    claimed,
                });
            }
        }
        // The group is signed by the transaction sender, who can only spend
        // from its own account.
        if let Some(payment) = group.iter().find(|p| p.sender != ctx.sender) {
            return Err(DevnetError::UnauthorizedSender {
                sender: ctx.sender,
                claimed: payment.sender,
            });
        }

        let mut txn = self.begin(app_id);

        for payment in group {
            txn.transfer(payment.sender, payment.receiver, payment.amount)?;
            txn.charge(payment.sender, txn.costs.min_fee)?;
        }

        let value = call(&mut beacon, &mut txn)?;

        let fee = txn.costs.min_fee * (1 + txn.inner_calls);
        txn.charge(ctx.sender, fee)?;

        if !txn.closed {
            let required = txn.costs.account_min_balance + beacon.storage_mbr(txn.costs);
            let balance = txn.balance(&txn.app_address);
            if balance < required {
                return Err(DevnetError::BelowMinimumBalance {
                    address: txn.app_address,
                    balance,
                    required,
                });
            }
        }

        let effects = txn.finish();
        self.commit(app_id, Some(beacon), effects);
        Ok(value)
    }

    fn commit(&mut self, app_id: AppId, beacon: Option<Beacon>, effects: TxnEffects) {
        self.balances = effects.balances;
        self.consumers.extend(effects.consumers);
        let round = self.round;
        self.events.extend(
            effects
                .events
                .into_iter()
                .map(|event| LoggedEvent { round, app_id, event }),
        );
        match beacon {
            Some(beacon) if !effects.closed => {
                self.beacons.insert(app_id, beacon);
            }
            _ => {
                self.beacons.remove(&app_id);
            }
        }
    }
}

/// Effects of a transaction that succeeded and is ready to commit.
struct TxnEffects {
    balances: BTreeMap<Address, u64>,
    consumers: BTreeMap<AppId, Box<dyn RandomnessConsumer>>,
    events: Vec<BeaconEvent>,
    closed: bool,
}

/// Staged execution context of one application call.
struct Txn<'a> {
    app_address: Address,
    round: Round,
    genesis: &'a [u8; 32],
    seed_lookback: u64,
    costs: &'a StandardCostModel,
    consumers: &'a BTreeMap<AppId, Box<dyn RandomnessConsumer>>,
    balances: BTreeMap<Address, u64>,
    staged_consumers: BTreeMap<AppId, Box<dyn RandomnessConsumer>>,
    events: Vec<BeaconEvent>,
    inner_calls: u64,
    budget: u64,
    closed: bool,
}

impl Txn<'_> {
    fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u64) -> Result<(), HostError> {
        debit(&mut self.balances, from, amount)?;
        credit(&mut self.balances, to, amount);
        Ok(())
    }

    fn charge(&mut self, payer: Address, fee: u64) -> Result<(), HostError> {
        debit(&mut self.balances, payer, fee)
    }

    fn finish(self) -> TxnEffects {
        TxnEffects {
            balances: self.balances,
            consumers: self.staged_consumers,
            events: self.events,
            closed: self.closed,
        }
    }
}

impl Environment for Txn<'_> {
    fn current_round(&self) -> Round {
        self.round
    }

    fn block_seed(&self, round: Round) -> Result<Seed, HostError> {
        if round > self.round || self.round - round > self.seed_lookback {
            return Err(HostError::SeedUnavailable(round));
        }
        Ok(seed_for(self.genesis, round))
    }

    fn seed_lookback(&self) -> u64 {
        self.seed_lookback
    }

    fn application_address(&self) -> Address {
        self.app_address
    }

    fn cost_model(&self) -> &dyn CostModel {
        self.costs
    }

    fn ensure_budget(&mut self, opcodes: u64) -> Result<(), HostError> {
        let per_call = self.costs.app_call_budget.max(1);
        let top_ups = opcodes.saturating_sub(self.budget).div_ceil(per_call);
        self.budget += top_ups * per_call;
        self.inner_calls += top_ups;
        Ok(())
    }

    fn pay(&mut self, receiver: Address, amount: u64) -> Result<(), HostError> {
        self.transfer(self.app_address, receiver, amount)?;
        self.inner_calls += 1;
        Ok(())
    }

    fn invoke_callback(
        &mut self,
        app: AppId,
        request_id: RequestId,
        requester: Address,
        output: &VrfOutput,
    ) -> Result<(), HostError> {
        let consumer = match self.staged_consumers.entry(app) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let live = self
                    .consumers
                    .get(&app)
                    .ok_or(HostError::ApplicationNotFound(app))?;
                entry.insert(live.clone_box())
            }
        };
        self.inner_calls += 1;
        consumer
            .fulfill_randomness(self.app_address, request_id, requester, output)
            .map_err(|e| HostError::CallbackRejected {
                app,
                reason: e.to_string(),
            })
    }

    fn close_application(&mut self, receiver: Address) -> Result<(), HostError> {
        let remaining = self.balance(&self.app_address);
        self.transfer(self.app_address, receiver, remaining)?;
        self.inner_calls += 1;
        self.closed = true;
        Ok(())
    }

    fn emit(&mut self, event: BeaconEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_deterministic_and_windowed() {
        let mut devnet = Devnet::new(DevnetConfig {
            seed_lookback: 10,
            ..DevnetConfig::default()
        });
        devnet.advance_rounds(20);
        let round = devnet.round();

        assert!(devnet.block_seed(round + 1).is_err());
        assert_eq!(devnet.block_seed(round).unwrap(), devnet.block_seed(round).unwrap());
        assert_ne!(devnet.block_seed(round).unwrap(), devnet.block_seed(round - 1).unwrap());
        assert!(devnet.block_seed(round - 10).is_ok());
        assert_eq!(
            devnet.block_seed(round - 11),
            Err(HostError::SeedUnavailable(round - 11))
        );
    }

    #[test]
    fn application_addresses_are_distinct() {
        assert_ne!(application_address(AppId(1)), application_address(AppId(2)));
        assert!(!application_address(AppId(1)).is_zero());
    }

    #[test]
    fn deploy_funds_account_minimum() {
        let mut devnet = Devnet::default();
        let creator = Address([1; 32]);
        devnet.fund(creator, 1_000_000);
        let (pk, _) = crate::vrf::keypair();

        let app = devnet.deploy_beacon(creator, pk, 10, 100, 1_000).unwrap();

        assert_eq!(devnet.balance(&application_address(app)), 100_000);
        assert_eq!(devnet.balance(&creator), 1_000_000 - 100_000 - 2_000);
        assert_eq!(devnet.beacon(app).unwrap().state().manager, creator);
    }

    #[test]
    fn failed_deploy_changes_nothing() {
        let mut devnet = Devnet::default();
        let creator = Address([1; 32]);
        devnet.fund(creator, 1_000_000);
        let (pk, _) = crate::vrf::keypair();

        let err = devnet.deploy_beacon(creator, pk, 10, 100, 1_001).unwrap_err();
        assert_eq!(err.code(), "TimeoutExceedsSeedLookback");
        assert_eq!(devnet.balance(&creator), 1_000_000);
        assert!(devnet.beacon(AppId(1)).is_none());
    }

    #[test]
    fn unknown_app_is_reported() {
        let mut devnet = Devnet::default();
        assert_eq!(
            devnet.cancel_request(AppId(7), Address([1; 32]), 0),
            Err(DevnetError::AppNotFound(AppId(7)))
        );
    }

    #[test]
    fn grouped_payments_must_come_from_the_sender() {
        let mut devnet = Devnet::default();
        let (creator, victim, thief) = (Address([1; 32]), Address([2; 32]), Address([3; 32]));
        devnet.fund(creator, 1_000_000);
        devnet.fund(victim, 1_000_000);
        devnet.fund(thief, 1_000_000);
        let (pk, _) = crate::vrf::keypair();
        let app = devnet.deploy_beacon(creator, pk, 10, 100, 1_000).unwrap();
        let payment = Payment {
            sender: victim,
            receiver: application_address(app),
            amount: devnet.get_costs(app).unwrap().total(),
        };
        let round = devnet.round() + 1;

        let err = devnet
            .create_request(app, CallContext::account(thief), thief, round, payment)
            .unwrap_err();
        assert_eq!(
            err,
            DevnetError::UnauthorizedSender {
                sender: thief,
                claimed: victim
            }
        );
        assert_eq!(err.code(), "UnauthorizedSender");

        // An application context must carry that application's own address.
        let forged = CallContext::application(AppId(99), victim);
        let err = devnet.create_request(app, forged, victim, round, payment).unwrap_err();
        assert_eq!(err.code(), "UnauthorizedSender");

        assert_eq!(devnet.balance(&victim), 1_000_000);
        assert_eq!(devnet.balance(&thief), 1_000_000);
    }
}
