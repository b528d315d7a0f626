use tracing::debug;

use crate::costs::VRF_VERIFY_COST;
use crate::errors::BeaconError;
use crate::events::BeaconEvent;
use crate::host::{CallContext, Environment};
use crate::types::RequestId;
use crate::vrf::{self, VrfProof};
use crate::Beacon;

/// Fulfill a pending request with a VRF proof over its target round's seed.
///
/// Manager only. The record is deleted, and fees and deposit paid out, only
/// after the proof verifies and the requester's callback succeeds; any
/// failure leaves the request pending for a later retry.
///
/// `proof` is the 96-byte sr25519 VRF proof (32-byte pre-output followed by
/// the 64-byte DLEQ proof), not the 80-byte ECVRF proof other ledgers use;
/// its output is the 64-byte SHA-512 described in [`crate::vrf`].
pub fn handler(
    beacon: &mut Beacon,
    ctx: &CallContext,
    env: &mut dyn Environment,
    request_id: RequestId,
    proof: &VrfProof,
) -> Result<(), BeaconError> {
    beacon.manager.require_manager(&ctx.sender)?;

    let request = beacon
        .requests
        .get(request_id)
        .ok_or(BeaconError::RequestNotFound(request_id))?;

    // Fails once the round has left the host's lookback window.
    let seed = env.block_seed(request.round)?;

    env.ensure_budget(VRF_VERIFY_COST)?;
    let output = vrf::verify(&beacon.globals.public_key, proof, seed.as_bytes())
        .map_err(|_| BeaconError::InvalidProof)?;

    env.invoke_callback(
        request.requester_app_id,
        request_id,
        request.requester_address,
        &output,
    )?;

    env.pay(ctx.sender, request.costs.fees)?;
    env.pay(request.requester_address, request.costs.box_mbr)?;

    env.emit(BeaconEvent::RequestFulfilled {
        request_id,
        requester_app_id: request.requester_app_id,
        requester_address: request.requester_address,
        output,
    });
    beacon.requests.remove(request_id);
    beacon.globals.total_pending_requests -= 1;

    debug!(request_id, round = request.round, "request fulfilled");
    Ok(())
}
