use thiserror::Error;

use crate::types::{AppId, Address, RequestId, Round};

/// Return early with the given error unless the condition holds.
macro_rules! require {
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

pub(crate) use require;

/// Failures raised by the host environment while executing a contract call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The block seed of this round is in the future or outside the lookback window.
    #[error("block seed for round {0} is not available")]
    SeedUnavailable(Round),
    /// An account cannot cover a payment or fee.
    #[error("account {address} has {balance}, needs {required}")]
    InsufficientFunds {
        address: Address,
        balance: u64,
        required: u64,
    },
    /// The inner call targeted an application that does not exist.
    #[error("application {0} does not exist")]
    ApplicationNotFound(AppId),
    /// The requester's callback returned an error.
    #[error("callback into application {app} failed: {reason}")]
    CallbackRejected { app: AppId, reason: String },
}

/// Error codes for the beacon contract.
///
/// Every variant aborts the whole call; no state is mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeaconError {
    /// A `createApplication` parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The configured key is not a valid VRF public key.
    #[error("invalid VRF public key")]
    InvalidPublicKey,
    /// `staleRequestTimeout` would let requests outlive their block seed.
    #[error("stale request timeout {timeout} exceeds the seed lookback of {lookback} rounds")]
    TimeoutExceedsSeedLookback { timeout: u64, lookback: u64 },
    /// New requests are refused while the service is paused.
    #[error("service is paused")]
    Paused,
    #[error("too many pending requests (max {max})")]
    TooManyPendingRequests { max: u64 },
    #[error("round {round} is not after the current round {current}")]
    RoundNotInFuture { round: Round, current: Round },
    #[error("round {round} is more than {max_future_rounds} rounds after {current}")]
    RoundTooFar {
        round: Round,
        current: Round,
        max_future_rounds: u64,
    },
    /// Requests must come from an application so the callback has a target.
    #[error("caller must be an application")]
    CallerNotApplication,
    #[error("costs payment must be sent to the beacon address")]
    InvalidPaymentReceiver,
    #[error("costs payment of {paid} is below the required {required}")]
    InsufficientPayment { paid: u64, required: u64 },
    #[error("request {0} not found")]
    RequestNotFound(RequestId),
    #[error("request {0} already exists")]
    RequestExists(RequestId),
    /// Signer is not the manager.
    #[error("unauthorized")]
    Unauthorized,
    #[error("zero address not allowed")]
    ZeroAddressNotAllowed,
    #[error("VRF proof verification failed")]
    InvalidProof,
    #[error("request {request_id} is not stale until round {stale_at} (current {current})")]
    RequestNotStale {
        request_id: RequestId,
        stale_at: Round,
        current: Round,
    },
    #[error("{0} requests are still pending")]
    PendingRequestsExist(u64),
    /// The request counter would overflow u64 (practically unreachable).
    #[error("request counter overflow")]
    CounterOverflow,
    #[error(transparent)]
    Host(#[from] HostError),
}

impl BeaconError {
    /// Stable name of the failure, suitable for matching by remote callers.
    pub fn code(&self) -> &'static str {
        match self {
            BeaconError::InvalidConfig(_) => "InvalidConfig",
            BeaconError::InvalidPublicKey => "InvalidPublicKey",
            BeaconError::TimeoutExceedsSeedLookback { .. } => "TimeoutExceedsSeedLookback",
            BeaconError::Paused => "Paused",
            BeaconError::TooManyPendingRequests { .. } => "TooManyPendingRequests",
            BeaconError::RoundNotInFuture { .. } => "RoundNotInFuture",
            BeaconError::RoundTooFar { .. } => "RoundTooFar",
            BeaconError::CallerNotApplication => "CallerNotApplication",
            BeaconError::InvalidPaymentReceiver => "InvalidPaymentReceiver",
            BeaconError::InsufficientPayment { .. } => "InsufficientPayment",
            BeaconError::RequestNotFound(_) => "RequestNotFound",
            BeaconError::RequestExists(_) => "RequestExists",
            BeaconError::Unauthorized => "Unauthorized",
            BeaconError::ZeroAddressNotAllowed => "ZeroAddressNotAllowed",
            BeaconError::InvalidProof => "InvalidProof",
            BeaconError::RequestNotStale { .. } => "RequestNotStale",
            BeaconError::PendingRequestsExist(_) => "PendingRequestsExist",
            BeaconError::CounterOverflow => "CounterOverflow",
            BeaconError::Host(HostError::SeedUnavailable(_)) => "SeedUnavailable",
            BeaconError::Host(HostError::InsufficientFunds { .. }) => "InsufficientFunds",
            BeaconError::Host(HostError::ApplicationNotFound(_)) => "ApplicationNotFound",
            BeaconError::Host(HostError::CallbackRejected { .. }) => "CallbackRejected",
        }
    }
}
