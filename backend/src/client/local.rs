use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use beacon::devnet::{Devnet, DevnetError};
use beacon::vrf::VrfProof;
use beacon::{Address, AppId, BeaconState, HostError, RandomnessRequest, RequestId, Round, Seed};

use super::{BeaconClient, ClientError, Receipt};

/// Client over a devnet owned by the same process.
///
/// Calls are attributed to `operator` without a signature.
#[derive(Clone)]
pub struct LocalClient {
    devnet: Arc<Mutex<Devnet>>,
    app_id: AppId,
    operator: Address,
}

impl LocalClient {
    pub fn new(devnet: Arc<Mutex<Devnet>>, app_id: AppId, operator: Address) -> Self {
        Self {
            devnet,
            app_id,
            operator,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Devnet>, ClientError> {
        self.devnet
            .lock()
            .map_err(|_| ClientError::Transport("devnet lock poisoned".into()))
    }
}

fn rejected(err: DevnetError) -> ClientError {
    ClientError::Rejected {
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl BeaconClient for LocalClient {
    async fn last_round(&self) -> Result<Round, ClientError> {
        Ok(self.lock()?.round())
    }

    async fn beacon_state(&self) -> Result<BeaconState, ClientError> {
        let devnet = self.lock()?;
        devnet
            .beacon(self.app_id)
            .map(|beacon| beacon.state())
            .ok_or_else(|| rejected(DevnetError::AppNotFound(self.app_id)))
    }

    async fn pending_requests(&self) -> Result<Vec<RandomnessRequest>, ClientError> {
        self.lock()?.pending_requests(self.app_id).map_err(rejected)
    }

    async fn block_seed(&self, round: Round) -> Result<Seed, ClientError> {
        self.lock()?.block_seed(round).map_err(|err| match err {
            HostError::SeedUnavailable(round) => ClientError::SeedUnavailable(round),
            other => rejected(other.into()),
        })
    }

    async fn complete_request(&self, request_id: RequestId, proof: &VrfProof) -> Result<Receipt, ClientError> {
        let mut devnet = self.lock()?;
        devnet
            .complete_request(self.app_id, self.operator, request_id, proof)
            .map_err(rejected)?;
        Ok(Receipt { round: devnet.round() })
    }

    async fn cancel_request(&self, request_id: RequestId) -> Result<Receipt, ClientError> {
        let mut devnet = self.lock()?;
        devnet
            .cancel_request(self.app_id, self.operator, request_id)
            .map_err(rejected)?;
        Ok(Receipt { round: devnet.round() })
    }
}
