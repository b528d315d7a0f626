//! Fee and storage cost model of the host ledger.
//!
//! The contract derives every amount it charges from a [`CostModel`] supplied
//! by the host, so retargeting to a host with different rent or fee rules
//! only needs a new implementation of the trait.

use serde::{Deserialize, Serialize};

/// Opcode budget consumed by one VRF verification.
pub const VRF_VERIFY_COST: u64 = 5_700;

/// Inner payments made by `completeRequest` (fees to submitter, storage refund to requester).
pub const COMPLETE_PAYOUTS: u64 = 2;

/// Cancellation incentive paid to a third-party canceller, in minimum fees.
///
/// Covers the cancel call itself plus its two inner payments.
pub const CANCEL_INCENTIVE_FEES: u64 = 3;

/// Host-provided pricing rules.
pub trait CostModel {
    /// Minimum fee of one (inner or outer) transaction.
    fn min_fee(&self) -> u64;
    /// Flat storage cost of creating one box.
    fn box_create_cost(&self) -> u64;
    /// Storage cost per byte of box key and value.
    fn box_byte_cost(&self) -> u64;
    /// Opcode budget granted per application call.
    fn app_call_budget(&self) -> u64;
    /// Minimum balance every account must hold.
    fn account_min_balance(&self) -> u64;

    /// Storage deposit locked by one box: `create + byte * (key + value)`.
    fn box_mbr(&self, key_len: usize, value_len: usize) -> u64 {
        self.box_create_cost() + self.box_byte_cost() * (key_len + value_len) as u64
    }

    /// Number of extra application calls needed to reach `target` opcodes.
    fn budget_top_ups(&self, target: u64) -> u64 {
        let per_call = self.app_call_budget().max(1);
        target.saturating_sub(per_call).div_ceil(per_call)
    }
}

/// Default pricing, in micro-units of the native asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardCostModel {
    pub min_fee: u64,
    pub box_create_cost: u64,
    pub box_byte_cost: u64,
    pub app_call_budget: u64,
    pub account_min_balance: u64,
}

impl Default for StandardCostModel {
    fn default() -> Self {
        Self {
            min_fee: 1_000,
            box_create_cost: 2_500,
            box_byte_cost: 400,
            app_call_budget: 700,
            account_min_balance: 100_000,
        }
    }
}

impl CostModel for StandardCostModel {
    fn min_fee(&self) -> u64 {
        self.min_fee
    }

    fn box_create_cost(&self) -> u64 {
        self.box_create_cost
    }

    fn box_byte_cost(&self) -> u64 {
        self.box_byte_cost
    }

    fn app_call_budget(&self) -> u64 {
        self.app_call_budget
    }

    fn account_min_balance(&self) -> u64 {
        self.account_min_balance
    }
}

/// Amounts a requester must pre-pay with `createRequest`.
///
/// Both are lower bounds; overpayment is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Costs {
    /// Reimbursement for whoever submits `completeRequest`.
    pub fees: u64,
    /// Storage deposit for the request record, refunded to the requester.
    pub box_mbr: u64,
}

impl Costs {
    pub fn total(&self) -> u64 {
        self.fees + self.box_mbr
    }
}

/// Fee reimbursement covering a `completeRequest` transaction:
/// the base call, the budget top-ups for VRF verification, both payouts and
/// the inner callback call.
pub fn completion_fees(model: &dyn CostModel) -> u64 {
    let calls = 1 + model.budget_top_ups(VRF_VERIFY_COST) + COMPLETE_PAYOUTS + 1;
    calls * model.min_fee()
}

/// Amount paid to a canceller who is not the requester.
pub fn cancel_incentive(model: &dyn CostModel) -> u64 {
    CANCEL_INCENTIVE_FEES * model.min_fee()
}
