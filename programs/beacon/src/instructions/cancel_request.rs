use tracing::debug;

use crate::costs::cancel_incentive;
use crate::errors::{require, BeaconError};
use crate::events::BeaconEvent;
use crate::host::{CallContext, Environment};
use crate::types::RequestId;
use crate::Beacon;

/// Unwind a stale request.
///
/// Callable by anyone once `current_round >= round + stale_request_timeout`.
/// The refund pool is `box_mbr + fees`; a canceller other than the requester
/// receives the fixed incentive from it and the requester gets the rest.
pub fn handler(
    beacon: &mut Beacon,
    ctx: &CallContext,
    env: &mut dyn Environment,
    request_id: RequestId,
) -> Result<(), BeaconError> {
    let request = beacon
        .requests
        .get(request_id)
        .ok_or(BeaconError::RequestNotFound(request_id))?;

    let current = env.current_round();
    let stale_at = request.stale_at(beacon.globals.stale_request_timeout);
    require!(
        current >= stale_at,
        BeaconError::RequestNotStale {
            request_id,
            stale_at,
            current,
        }
    );

    let mut refund = request.costs.box_mbr + request.costs.fees;
    let mut incentive = 0;
    if ctx.sender != request.requester_address {
        incentive = cancel_incentive(env.cost_model()).min(refund);
        env.pay(ctx.sender, incentive)?;
        refund -= incentive;
    }
    if refund > 0 {
        env.pay(request.requester_address, refund)?;
    }

    env.emit(BeaconEvent::RequestCancelled {
        request_id,
        canceller: ctx.sender,
        refund,
        incentive,
    });
    beacon.requests.remove(request_id);
    beacon.globals.total_pending_requests -= 1;

    debug!(request_id, round = request.round, lateness = request.lateness(current), "request cancelled");
    Ok(())
}
