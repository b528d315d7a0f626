use crate::errors::{require, BeaconError};
use crate::host::{CallContext, Environment};
use crate::types::Address;
use crate::Beacon;

pub fn transfer_manager(
    beacon: &mut Beacon,
    ctx: &CallContext,
    env: &mut dyn Environment,
    new_manager: Address,
) -> Result<(), BeaconError> {
    let event = beacon.manager.transfer(&ctx.sender, new_manager)?;
    env.emit(event);
    Ok(())
}

pub fn pause(beacon: &mut Beacon, ctx: &CallContext, env: &mut dyn Environment) -> Result<(), BeaconError> {
    beacon.manager.require_manager(&ctx.sender)?;
    if let Some(event) = beacon.pausable.pause() {
        env.emit(event);
    }
    Ok(())
}

pub fn unpause(beacon: &mut Beacon, ctx: &CallContext, env: &mut dyn Environment) -> Result<(), BeaconError> {
    beacon.manager.require_manager(&ctx.sender)?;
    if let Some(event) = beacon.pausable.unpause() {
        env.emit(event);
    }
    Ok(())
}

pub fn update_application(beacon: &mut Beacon, ctx: &CallContext) -> Result<(), BeaconError> {
    beacon.manager.require_manager(&ctx.sender)
}

/// Delete the beacon and return its remaining balance to the manager.
pub fn delete_application(
    beacon: &mut Beacon,
    ctx: &CallContext,
    env: &mut dyn Environment,
) -> Result<(), BeaconError> {
    beacon.manager.require_manager(&ctx.sender)?;
    let pending = beacon.globals.total_pending_requests;
    require!(pending == 0, BeaconError::PendingRequestsExist(pending));
    env.close_application(beacon.manager.address())?;
    Ok(())
}
