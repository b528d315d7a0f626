use std::any::Any;
use std::collections::BTreeMap;

use beacon::devnet::{application_address, Devnet, DevnetError};
use beacon::vrf::VrfOutput;
use beacon::{Address, AppId, CallContext, CallbackError, Payment, RandomnessConsumer, RequestId};
use thiserror::Error;

/// A dice roll backed by beacon randomness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceRoll {
    /// The player who requested the roll.
    pub player: Address,
    /// The beacon request that settled this roll.
    pub request_id: RequestId,
    /// Dice outcome, `1..=6`.
    pub result: u8,
}

/// Error codes for the roll-dice application.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiceError {
    /// Randomness must come from the configured beacon.
    #[error("callback caller {0} is not the beacon")]
    UnauthorizedCallback(Address),
    /// Each beacon request settles at most one roll.
    #[error("request {0} has already been settled")]
    AlreadySettled(RequestId),
}

/// Dice game powered by the beacon.
///
/// 1. **Request**: [`request_roll`] pays the beacon's costs from the game
///    account and creates a request on behalf of the player.
/// 2. **Settle**: the beacon calls back with verified randomness and the
///    roll is derived from the first 8 bytes of output.
#[derive(Debug, Clone)]
pub struct DiceGame {
    beacon: Address,
    rolls: BTreeMap<RequestId, DiceRoll>,
}

impl DiceGame {
    pub fn new(beacon: Address) -> Self {
        Self {
            beacon,
            rolls: BTreeMap::new(),
        }
    }

    pub fn roll(&self, request_id: RequestId) -> Option<&DiceRoll> {
        self.rolls.get(&request_id)
    }

    pub fn rolls(&self) -> impl Iterator<Item = &DiceRoll> {
        self.rolls.values()
    }

    fn settle(
        &mut self,
        caller: Address,
        request_id: RequestId,
        player: Address,
        output: &VrfOutput,
    ) -> Result<&DiceRoll, DiceError> {
        if caller != self.beacon {
            return Err(DiceError::UnauthorizedCallback(caller));
        }
        if self.rolls.contains_key(&request_id) {
            return Err(DiceError::AlreadySettled(request_id));
        }
        let roll = DiceRoll {
            player,
            request_id,
            result: dice_value(output),
        };
        Ok(self.rolls.entry(request_id).or_insert(roll))
    }
}

impl RandomnessConsumer for DiceGame {
    fn fulfill_randomness(
        &mut self,
        caller: Address,
        request_id: RequestId,
        requester: Address,
        output: &VrfOutput,
    ) -> Result<(), CallbackError> {
        self.settle(caller, request_id, requester, output)?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn RandomnessConsumer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Map output to `1..=6`: first 8 bytes as little-endian `u64`, modulo 6.
///
/// Bias is negligible over the 2^64 range.
pub fn dice_value(output: &VrfOutput) -> u8 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&output.0[..8]);
    (u64::from_le_bytes(word) % 6 + 1) as u8
}

/// Request a roll for `player` settling `rounds_ahead` rounds from now.
///
/// The game account pays exactly the beacon's current costs.
pub fn request_roll(
    devnet: &mut Devnet,
    game: AppId,
    beacon: AppId,
    player: Address,
    rounds_ahead: u64,
) -> Result<RequestId, DevnetError> {
    let costs = devnet.get_costs(beacon)?;
    let game_address = application_address(game);
    let payment = Payment {
        sender: game_address,
        receiver: application_address(beacon),
        amount: costs.total(),
    };
    let round = devnet.round() + rounds_ahead;
    devnet.create_request(
        beacon,
        CallContext::application(game, game_address),
        player,
        round,
        payment,
    )
}
