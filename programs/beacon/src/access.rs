//! Cross-cutting roles composed into the beacon.
//!
//! Each capability owns its own piece of state and exposes a guard the
//! transition functions call explicitly.

use serde::{Deserialize, Serialize};

use crate::errors::{require, BeaconError};
use crate::events::BeaconEvent;
use crate::types::Address;

/// Privileged role: completes requests and performs administration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    address: Address,
}

impl Manager {
    pub fn new(address: Address) -> Result<Self, BeaconError> {
        require!(!address.is_zero(), BeaconError::ZeroAddressNotAllowed);
        Ok(Self { address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn require_manager(&self, sender: &Address) -> Result<(), BeaconError> {
        require!(*sender == self.address, BeaconError::Unauthorized);
        Ok(())
    }

    /// Hand the role to `new_manager`. Only the current manager may do this.
    pub fn transfer(&mut self, sender: &Address, new_manager: Address) -> Result<BeaconEvent, BeaconError> {
        self.require_manager(sender)?;
        require!(!new_manager.is_zero(), BeaconError::ZeroAddressNotAllowed);
        let previous = std::mem::replace(&mut self.address, new_manager);
        Ok(BeaconEvent::ManagerTransferred {
            previous,
            manager: new_manager,
        })
    }
}

/// Pause switch for new requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pausable {
    paused: bool,
}

impl Pausable {
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn require_not_paused(&self) -> Result<(), BeaconError> {
        require!(!self.paused, BeaconError::Paused);
        Ok(())
    }

    /// Returns the event to emit, or `None` if already paused.
    pub fn pause(&mut self) -> Option<BeaconEvent> {
        (!std::mem::replace(&mut self.paused, true)).then_some(BeaconEvent::Paused)
    }

    /// Returns the event to emit, or `None` if not paused.
    pub fn unpause(&mut self) -> Option<BeaconEvent> {
        std::mem::replace(&mut self.paused, false).then_some(BeaconEvent::Unpaused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_manager_passes_guard() {
        let manager = Manager::new(Address([1; 32])).unwrap();
        assert!(manager.require_manager(&Address([1; 32])).is_ok());
        assert_eq!(
            manager.require_manager(&Address([2; 32])),
            Err(BeaconError::Unauthorized)
        );
    }

    #[test]
    fn transfer_rejects_zero_and_strangers() {
        let mut manager = Manager::new(Address([1; 32])).unwrap();
        assert_eq!(
            manager.transfer(&Address([2; 32]), Address([3; 32])),
            Err(BeaconError::Unauthorized)
        );
        assert_eq!(
            manager.transfer(&Address([1; 32]), Address::ZERO),
            Err(BeaconError::ZeroAddressNotAllowed)
        );
        manager.transfer(&Address([1; 32]), Address([3; 32])).unwrap();
        assert_eq!(manager.address(), Address([3; 32]));
    }

    #[test]
    fn pause_toggles_once() {
        let mut pausable = Pausable::default();
        assert_eq!(pausable.pause(), Some(BeaconEvent::Paused));
        assert_eq!(pausable.pause(), None);
        assert_eq!(pausable.require_not_paused(), Err(BeaconError::Paused));
        assert_eq!(pausable.unpause(), Some(BeaconEvent::Unpaused));
        assert_eq!(pausable.unpause(), None);
        assert!(pausable.require_not_paused().is_ok());
    }
}
