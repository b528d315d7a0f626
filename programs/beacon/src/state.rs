use serde::{Deserialize, Serialize};

use crate::costs::Costs;
use crate::storage::BoxValue;
use crate::types::{Address, AppId, RequestId, Round};
use crate::vrf::VrfPublicKey;

/// Global beacon configuration and counters.
///
/// Set once by `createApplication`; only the counters change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconGlobals {
    /// Key every proof is verified against.
    pub public_key: VrfPublicKey,
    /// Id handed to the next request. Never reused.
    pub next_request_id: RequestId,
    /// Number of live request records.
    pub total_pending_requests: u64,
    pub max_pending_requests: u64,
    pub max_future_rounds: u64,
    /// Rounds after the target round before anyone may cancel.
    pub stale_request_timeout: u64,
}

/// One outstanding randomness request. Presence in the ledger is the pending state.
///
/// Box key: `request_id` as `u64` big-endian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessRequest {
    pub request_id: RequestId,
    /// Round at which the request was accepted.
    pub created_at: Round,
    /// Application that made the request and receives the callback.
    pub requester_app_id: AppId,
    /// Account on whose behalf the request was made; receives refunds.
    pub requester_address: Address,
    /// Future round whose block seed is the VRF message.
    pub round: Round,
    pub costs: Costs,
}

impl RandomnessRequest {
    /// Rounds since the target round, zero while it is still in the future.
    pub fn lateness(&self, current: Round) -> u64 {
        current.saturating_sub(self.round)
    }

    /// First round at which the request may be cancelled.
    pub fn stale_at(&self, stale_request_timeout: u64) -> Round {
        self.round.saturating_add(stale_request_timeout)
    }
}

/// Value layout: created_at (8) + requester_app_id (8) + requester_address (32)
/// + round (8) + fees (8) + box_mbr (8) = 72 bytes. The id is the key.
impl BoxValue for RandomnessRequest {
    const ENCODED_LEN: usize = 72;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.extend_from_slice(&self.created_at.to_be_bytes());
        buf.extend_from_slice(&self.requester_app_id.0.to_be_bytes());
        buf.extend_from_slice(self.requester_address.as_bytes());
        buf.extend_from_slice(&self.round.to_be_bytes());
        buf.extend_from_slice(&self.costs.fees.to_be_bytes());
        buf.extend_from_slice(&self.costs.box_mbr.to_be_bytes());
        buf
    }

    fn decode(request_id: RequestId, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let u64_at = |at: usize| -> Option<u64> {
            Some(u64::from_be_bytes(bytes[at..at + 8].try_into().ok()?))
        };
        let mut address = [0u8; 32];
        address.copy_from_slice(&bytes[16..48]);
        Some(Self {
            request_id,
            created_at: u64_at(0)?,
            requester_app_id: AppId(u64_at(8)?),
            requester_address: Address(address),
            round: u64_at(48)?,
            costs: Costs {
                fees: u64_at(56)?,
                box_mbr: u64_at(64)?,
            },
        })
    }
}

/// Read-only snapshot of the beacon's global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconState {
    pub manager: Address,
    pub paused: bool,
    #[serde(flatten)]
    pub globals: BeaconGlobals,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RandomnessRequest {
        RandomnessRequest {
            request_id: 9,
            created_at: 100,
            requester_app_id: AppId(42),
            requester_address: Address([5u8; 32]),
            round: 101,
            costs: Costs {
                fees: 12_000,
                box_mbr: 34_500,
            },
        }
    }

    #[test]
    fn encoded_len_matches_layout() {
        let encoded = sample().encode();
        assert_eq!(encoded.len(), RandomnessRequest::ENCODED_LEN);
        assert_eq!(&encoded[48..56], &101u64.to_be_bytes());
    }

    #[test]
    fn decode_restores_value_fields() {
        let request = sample();
        let decoded = RandomnessRequest::decode(9, &request.encode()).unwrap();
        assert_eq!(decoded, request);
        assert!(RandomnessRequest::decode(9, &[0u8; 71]).is_none());
    }

    #[test]
    fn staleness_helpers() {
        let request = sample();
        assert_eq!(request.lateness(50), 0);
        assert_eq!(request.lateness(111), 10);
        assert_eq!(request.stale_at(1_000), 1_101);
    }
}
