//! Wire types of the devnet node's HTTP API.
//!
//! Shared by the node handlers and the RPC client so both sides agree on
//! the JSON shapes. Beacon state, request records and costs are served as
//! the contract's own serde types.

use beacon::{Round, Seed};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub last_round: Round,
    pub seed_lookback: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedResponse {
    pub round: Round,
    pub seed: Seed,
}

/// Acknowledgement of a committed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Round in which the call was committed.
    pub round: Round,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable failure name, e.g. `RequestNotFound`.
    pub code: String,
    pub message: String,
}
