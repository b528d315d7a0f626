use std::any::Any;

use crate::types::{Address, RequestId};
use crate::vrf::VrfOutput;

/// Error returned by a requester application; aborts the whole completion.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Interface every requester application implements.
///
/// The beacon invokes it as `fulfillRandomness(requestId, requesterAddress, output)`.
/// `caller` is the beacon's application address so the consumer can refuse
/// randomness from anyone else.
pub trait RandomnessConsumer: Send {
    fn fulfill_randomness(
        &mut self,
        caller: Address,
        request_id: RequestId,
        requester: Address,
        output: &VrfOutput,
    ) -> Result<(), CallbackError>;

    /// Snapshot used by hosts that stage application state per transaction.
    fn clone_box(&self) -> Box<dyn RandomnessConsumer>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn RandomnessConsumer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
