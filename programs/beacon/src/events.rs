use serde::{Deserialize, Serialize};

use crate::state::RandomnessRequest;
use crate::types::{Address, AppId, RequestId};
use crate::vrf::VrfOutput;

/// Lifecycle events, emitted exactly once per successful transition.
///
/// Indexers and the off-chain daemon can follow the ledger through these
/// without reading state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BeaconEvent {
    /// A new request was stored.
    RequestCreated { request: RandomnessRequest },
    /// The requester's callback received verified randomness.
    RequestFulfilled {
        request_id: RequestId,
        requester_app_id: AppId,
        requester_address: Address,
        output: VrfOutput,
    },
    /// A stale request was unwound and its deposit refunded.
    RequestCancelled {
        request_id: RequestId,
        canceller: Address,
        refund: u64,
        incentive: u64,
    },
    ManagerTransferred { previous: Address, manager: Address },
    Paused,
    Unpaused,
}
