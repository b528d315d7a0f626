use tracing::debug;

use crate::costs::Costs;
use crate::errors::{require, BeaconError};
use crate::events::BeaconEvent;
use crate::host::{CallContext, Environment, Payment};
use crate::state::RandomnessRequest;
use crate::types::{Address, RequestId, Round};
use crate::Beacon;

/// Create a new randomness request.
///
/// Checks run in order and the first failure aborts the call:
/// 1. The service is not paused.
/// 2. There is room for another pending request.
/// 3. `round` is after the current round...
/// 4. ...and at most `max_future_rounds` after it.
/// 5. The caller is an application, so there is a callback target.
/// 6. `costs_payment` pays this application at least `get_costs().total()`.
///
/// Anything paid above the storage deposit is stored as `costs.fees`: it is
/// paid to the completer, or refunded with the deposit on cancellation.
pub fn handler(
    beacon: &mut Beacon,
    ctx: &CallContext,
    env: &mut dyn Environment,
    requester_address: Address,
    round: Round,
    costs_payment: &Payment,
) -> Result<RequestId, BeaconError> {
    beacon.pausable.require_not_paused()?;

    let globals = &beacon.globals;
    require!(
        globals.total_pending_requests < globals.max_pending_requests,
        BeaconError::TooManyPendingRequests {
            max: globals.max_pending_requests,
        }
    );

    let current = env.current_round();
    require!(round > current, BeaconError::RoundNotInFuture { round, current });
    require!(
        round <= current.saturating_add(globals.max_future_rounds),
        BeaconError::RoundTooFar {
            round,
            current,
            max_future_rounds: globals.max_future_rounds,
        }
    );

    let requester_app_id = match ctx.caller_app {
        Some(app) if app.0 != 0 => app,
        _ => return Err(BeaconError::CallerNotApplication),
    };

    require!(
        costs_payment.receiver == env.application_address(),
        BeaconError::InvalidPaymentReceiver
    );
    let required = beacon.get_costs(env);
    require!(
        costs_payment.amount >= required.total(),
        BeaconError::InsufficientPayment {
            paid: costs_payment.amount,
            required: required.total(),
        }
    );

    let request_id = beacon.globals.next_request_id;
    let next_request_id = request_id
        .checked_add(1)
        .ok_or(BeaconError::CounterOverflow)?;

    let request = RandomnessRequest {
        request_id,
        created_at: current,
        requester_app_id,
        requester_address,
        round,
        costs: Costs {
            fees: costs_payment.amount - required.box_mbr,
            box_mbr: required.box_mbr,
        },
    };

    require!(
        beacon.requests.insert(request_id, &request),
        BeaconError::RequestExists(request_id)
    );
    beacon.globals.next_request_id = next_request_id;
    beacon.globals.total_pending_requests += 1;

    debug!(request_id, round, app = %requester_app_id, "request created");
    env.emit(BeaconEvent::RequestCreated { request });

    Ok(request_id)
}
