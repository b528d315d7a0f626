use crate::access::{Manager, Pausable};
use crate::errors::{require, BeaconError};
use crate::host::{CallContext, Environment};
use crate::state::BeaconGlobals;
use crate::storage::BoxMap;
use crate::vrf::VrfPublicKey;
use crate::Beacon;

/// Initialize the beacon. The sender becomes the manager.
///
/// All numeric parameters must be non-zero, and `stale_request_timeout` may
/// not exceed the host's seed lookback: a request that is not yet stale must
/// always still be provable.
pub fn handler(
    ctx: &CallContext,
    env: &mut dyn Environment,
    public_key: VrfPublicKey,
    max_pending_requests: u64,
    max_future_rounds: u64,
    stale_request_timeout: u64,
) -> Result<Beacon, BeaconError> {
    require!(
        max_pending_requests > 0,
        BeaconError::InvalidConfig("max_pending_requests must be greater than zero")
    );
    require!(
        max_future_rounds > 0,
        BeaconError::InvalidConfig("max_future_rounds must be greater than zero")
    );
    require!(
        stale_request_timeout > 0,
        BeaconError::InvalidConfig("stale_request_timeout must be greater than zero")
    );
    let lookback = env.seed_lookback();
    require!(
        stale_request_timeout <= lookback,
        BeaconError::TimeoutExceedsSeedLookback {
            timeout: stale_request_timeout,
            lookback,
        }
    );
    require!(public_key.is_valid(), BeaconError::InvalidPublicKey);

    Ok(Beacon {
        globals: BeaconGlobals {
            public_key,
            next_request_id: 0,
            total_pending_requests: 0,
            max_pending_requests,
            max_future_rounds,
            stale_request_timeout,
        },
        manager: Manager::new(ctx.sender)?,
        pausable: Pausable::default(),
        requests: BoxMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use crate::devnet::Devnet;
    use crate::errors::BeaconError;
    use crate::types::Address;
    use crate::vrf::{self, VrfPublicKey};

    fn deploy(pk: VrfPublicKey, max_pending: u64, max_future: u64, timeout: u64) -> Result<(), &'static str> {
        let mut devnet = Devnet::default();
        let creator = Address([1; 32]);
        devnet.fund(creator, 1_000_000);
        devnet
            .deploy_beacon(creator, pk, max_pending, max_future, timeout)
            .map(|_| ())
            .map_err(|e| e.code())
    }

    #[test]
    fn rejects_zero_parameters() {
        let (pk, _) = vrf::keypair();
        assert_eq!(deploy(pk, 0, 10, 10), Err("InvalidConfig"));
        assert_eq!(deploy(pk, 10, 0, 10), Err("InvalidConfig"));
        assert_eq!(deploy(pk, 10, 10, 0), Err("InvalidConfig"));
        assert_eq!(deploy(pk, 1, 1, 1), Ok(()));
    }

    #[test]
    fn timeout_is_bounded_by_seed_lookback() {
        let (pk, _) = vrf::keypair();
        assert_eq!(deploy(pk, 10, 10, 1_000), Ok(()));
        assert_eq!(deploy(pk, 10, 10, 1_001), Err("TimeoutExceedsSeedLookback"));
    }

    #[test]
    fn rejects_malformed_public_key() {
        assert_eq!(deploy(VrfPublicKey([0xff; 32]), 10, 10, 10), Err("InvalidPublicKey"));
    }

    #[test]
    fn zero_sender_cannot_be_manager() {
        let (pk, _) = vrf::keypair();
        let mut devnet = Devnet::default();
        let err = devnet.deploy_beacon(Address::ZERO, pk, 10, 10, 10).unwrap_err();
        assert_eq!(err, BeaconError::ZeroAddressNotAllowed.into());
    }
}
