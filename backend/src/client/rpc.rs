use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon::vrf::VrfProof;
use beacon::{AppId, BeaconState, RandomnessRequest, RequestId, Round, Seed};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{BeaconClient, ClientError, Receipt};
use crate::api::{ErrorResponse, SeedResponse, StatusResponse, SubmitResponse};
use crate::txn::{BeaconCall, OperatorKey};

/// HTTP request timeout for node calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a devnet node's HTTP API. Calls are signed with the operator key.
#[derive(Clone)]
pub struct RpcClient {
    base_url: String,
    app_id: AppId,
    operator: Arc<OperatorKey>,
    http: reqwest::Client,
}

impl RpcClient {
    pub fn new(rpc_url: &str, app_id: AppId, operator: Arc<OperatorKey>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: rpc_url.trim_end_matches('/').to_string(),
            app_id,
            operator,
            http,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        decode(resp).await
    }

    async fn submit(&self, call: BeaconCall) -> Result<Receipt, ClientError> {
        let url = format!("{}/v1/apps/{}/calls", self.base_url, self.app_id);
        let signed = self.operator.sign(self.app_id, call);
        debug!(%url, request_id = signed.call.request_id(), "POST");
        let resp = self
            .http
            .post(&url)
            .json(&signed)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let ack: SubmitResponse = decode(resp).await?;
        Ok(Receipt { round: ack.round })
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()));
    }
    if status.is_server_error() {
        return Err(ClientError::Transport(format!("node returned {status}")));
    }
    let body: ErrorResponse = resp
        .json()
        .await
        .map_err(|e| ClientError::Decode(format!("{status}: {e}")))?;
    Err(ClientError::Rejected {
        code: body.code,
        message: body.message,
    })
}

#[async_trait]
impl BeaconClient for RpcClient {
    async fn last_round(&self) -> Result<Round, ClientError> {
        let status: StatusResponse = self.get("/v1/status").await?;
        Ok(status.last_round)
    }

    async fn beacon_state(&self) -> Result<BeaconState, ClientError> {
        self.get(&format!("/v1/apps/{}/state", self.app_id)).await
    }

    async fn pending_requests(&self) -> Result<Vec<RandomnessRequest>, ClientError> {
        self.get(&format!("/v1/apps/{}/requests", self.app_id)).await
    }

    async fn block_seed(&self, round: Round) -> Result<Seed, ClientError> {
        match self.get::<SeedResponse>(&format!("/v1/rounds/{round}/seed")).await {
            Ok(resp) => Ok(resp.seed),
            Err(err) if err.code() == Some("SeedUnavailable") => Err(ClientError::SeedUnavailable(round)),
            Err(err) => Err(err),
        }
    }

    async fn complete_request(&self, request_id: RequestId, proof: &VrfProof) -> Result<Receipt, ClientError> {
        self.submit(BeaconCall::CompleteRequest {
            request_id,
            proof: *proof,
        })
        .await
    }

    async fn cancel_request(&self, request_id: RequestId) -> Result<Receipt, ClientError> {
        self.submit(BeaconCall::CancelRequest { request_id }).await
    }
}
