//! Ledger access for the daemon.
//!
//! [`BeaconClient`] is everything the poll loop needs from the chain: the
//! latest round, the beacon's state and request ledger, block seeds, and
//! submission of the two operator calls. [`LocalClient`] drives an
//! in-process devnet; [`RpcClient`] talks to a devnet node over HTTP.

mod local;
mod rpc;

pub use local::LocalClient;
pub use rpc::RpcClient;

use async_trait::async_trait;
use beacon::vrf::VrfProof;
use beacon::{BeaconState, RandomnessRequest, RequestId, Round, Seed};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The ledger evaluated the call and refused it.
    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("block seed for round {0} is not available")]
    SeedUnavailable(Round),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Stable failure name for ledger rejections.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { code, .. } => Some(code.as_str()),
            ClientError::SeedUnavailable(_) => Some("SeedUnavailable"),
            _ => None,
        }
    }

    /// Whether resubmitting the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

/// Confirmation of a committed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub round: Round,
}

#[async_trait]
pub trait BeaconClient: Send + Sync {
    async fn last_round(&self) -> Result<Round, ClientError>;

    async fn beacon_state(&self) -> Result<BeaconState, ClientError>;

    /// All live request records, in id order.
    async fn pending_requests(&self) -> Result<Vec<RandomnessRequest>, ClientError>;

    async fn block_seed(&self, round: Round) -> Result<Seed, ClientError>;

    async fn complete_request(&self, request_id: RequestId, proof: &VrfProof) -> Result<Receipt, ClientError>;

    async fn cancel_request(&self, request_id: RequestId) -> Result<Receipt, ClientError>;
}
