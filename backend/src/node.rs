//! HTTP front end for an in-memory devnet.
//!
//! Serves the beacon's read path and accepts signed operator calls:
//!
//! - `GET  /v1/status`
//! - `GET  /v1/rounds/{round}/seed`
//! - `GET  /v1/apps/{id}/state`
//! - `GET  /v1/apps/{id}/requests`
//! - `GET  /v1/apps/{id}/costs`
//! - `POST /v1/apps/{id}/calls`

use std::sync::{Arc, Mutex, MutexGuard};

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use beacon::devnet::{application_address, Devnet, DevnetConfig, DevnetError};
use beacon::{Address, AppId, BeaconError, HostError, Round};
use roll_dice::{request_roll, DiceGame};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ErrorResponse, SeedResponse, StatusResponse, SubmitResponse};
use crate::config::NodeConfig;
use crate::txn::{BeaconCall, SignedCall, TxnError};

pub type SharedDevnet = Arc<Mutex<Devnet>>;

const OPERATOR_FUNDING: u64 = 1_000_000_000_000;
const GAME_FUNDING: u64 = 100_000_000_000;
/// Target offset of generated dice rolls.
const DICE_ROUNDS_AHEAD: u64 = 2;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Devnet(#[from] DevnetError),
    #[error(transparent)]
    Signature(#[from] TxnError),
    #[error("call signed for app {signed} submitted to app {target}")]
    AppMismatch { signed: AppId, target: AppId },
    #[error("devnet state lock poisoned")]
    Poisoned,
}

impl NodeError {
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::Devnet(e) => e.code(),
            NodeError::Signature(_) => "InvalidSignature",
            NodeError::AppMismatch { .. } => "AppMismatch",
            NodeError::Poisoned => "Internal",
        }
    }
}

impl ResponseError for NodeError {
    fn status_code(&self) -> StatusCode {
        match self {
            NodeError::Devnet(DevnetError::AppNotFound(_))
            | NodeError::Devnet(DevnetError::Host(HostError::SeedUnavailable(_))) => StatusCode::NOT_FOUND,
            NodeError::Devnet(_) | NodeError::AppMismatch { .. } => StatusCode::BAD_REQUEST,
            NodeError::Signature(_) => StatusCode::UNAUTHORIZED,
            NodeError::Poisoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        })
    }
}

/// Applications created at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub beacon: AppId,
    pub game: AppId,
}

/// Build a devnet with a funded operator, a beacon managed by the operator,
/// and a dice game wired to that beacon.
pub fn bootstrap(config: &NodeConfig) -> Result<(Devnet, Deployment), DevnetError> {
    let mut devnet = Devnet::new(DevnetConfig {
        seed_lookback: config.seed_lookback,
        ..DevnetConfig::default()
    });

    let operator = config.operator_key.address();
    devnet.fund(operator, OPERATOR_FUNDING);

    let beacon = devnet.deploy_beacon(
        operator,
        config.prover.public_key(),
        config.max_pending_requests,
        config.max_future_rounds,
        config.stale_request_timeout,
    )?;
    let game = devnet.deploy_consumer(
        operator,
        Box::new(DiceGame::new(application_address(beacon))),
        GAME_FUNDING,
    )?;

    Ok((devnet, Deployment { beacon, game }))
}

/// Advance one round, submitting a dice roll every `dice_roll_every` rounds.
pub fn tick(devnet: &mut Devnet, deployment: Deployment, dice_roll_every: u64, player: Address) -> Round {
    let round = devnet.advance_rounds(1);
    if dice_roll_every > 0 && round % dice_roll_every == 0 {
        match request_roll(devnet, deployment.game, deployment.beacon, player, DICE_ROUNDS_AHEAD) {
            Ok(request_id) => info!(round, request_id, "Dice roll requested"),
            Err(e) => warn!(round, code = e.code(), error = %e, "Dice roll rejected"),
        }
    }
    round
}

/// Drive the round clock until shutdown.
pub async fn run_ticker(devnet: SharedDevnet, deployment: Deployment, config: NodeConfig, mut shutdown: watch::Receiver<bool>) {
    let player = config.operator_key.address();
    let mut interval = tokio::time::interval(config.round_interval);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        let Ok(mut guard) = devnet.lock() else {
            warn!("Devnet lock poisoned, stopping ticker");
            break;
        };
        let round = tick(&mut guard, deployment, config.dice_roll_every, player);
        debug!(round, "Round advanced");
    }
    info!("Ticker stopped");
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/v1/status", web::get().to(status))
        .route("/v1/rounds/{round}/seed", web::get().to(block_seed))
        .route("/v1/apps/{id}/state", web::get().to(app_state))
        .route("/v1/apps/{id}/requests", web::get().to(app_requests))
        .route("/v1/apps/{id}/costs", web::get().to(app_costs))
        .route("/v1/apps/{id}/calls", web::post().to(submit_call));
}

fn lock(devnet: &Mutex<Devnet>) -> Result<MutexGuard<'_, Devnet>, NodeError> {
    devnet.lock().map_err(|_| NodeError::Poisoned)
}

async fn status(devnet: web::Data<Mutex<Devnet>>) -> Result<HttpResponse, NodeError> {
    let devnet = lock(&devnet)?;
    Ok(HttpResponse::Ok().json(StatusResponse {
        last_round: devnet.round(),
        seed_lookback: devnet.seed_lookback(),
    }))
}

async fn block_seed(devnet: web::Data<Mutex<Devnet>>, path: web::Path<Round>) -> Result<HttpResponse, NodeError> {
    let round = path.into_inner();
    let seed = lock(&devnet)?.block_seed(round).map_err(DevnetError::from)?;
    Ok(HttpResponse::Ok().json(SeedResponse { round, seed }))
}

async fn app_state(devnet: web::Data<Mutex<Devnet>>, path: web::Path<u64>) -> Result<HttpResponse, NodeError> {
    let app = AppId(path.into_inner());
    let devnet = lock(&devnet)?;
    let beacon = devnet.beacon(app).ok_or(DevnetError::AppNotFound(app))?;
    Ok(HttpResponse::Ok().json(beacon.state()))
}

async fn app_requests(devnet: web::Data<Mutex<Devnet>>, path: web::Path<u64>) -> Result<HttpResponse, NodeError> {
    let requests = lock(&devnet)?.pending_requests(AppId(path.into_inner()))?;
    Ok(HttpResponse::Ok().json(requests))
}

async fn app_costs(devnet: web::Data<Mutex<Devnet>>, path: web::Path<u64>) -> Result<HttpResponse, NodeError> {
    let costs = lock(&devnet)?.get_costs(AppId(path.into_inner()))?;
    Ok(HttpResponse::Ok().json(costs))
}

async fn submit_call(
    devnet: web::Data<Mutex<Devnet>>,
    path: web::Path<u64>,
    body: web::Json<SignedCall>,
) -> Result<HttpResponse, NodeError> {
    let target = AppId(path.into_inner());
    let signed = body.into_inner();
    if signed.app_id != target {
        return Err(NodeError::AppMismatch {
            signed: signed.app_id,
            target,
        });
    }
    let sender = signed.verify()?;

    let mut devnet = lock(&devnet)?;
    let result = match &signed.call {
        BeaconCall::CompleteRequest { request_id, proof } => {
            devnet.complete_request(target, sender, *request_id, proof)
        }
        BeaconCall::CancelRequest { request_id } => devnet.cancel_request(target, sender, *request_id),
    };

    match result {
        Ok(()) => {
            info!(app = %target, sender = %sender, call = ?signed.call, "Call committed");
            Ok(HttpResponse::Ok().json(SubmitResponse { round: devnet.round() }))
        }
        Err(e) => {
            // Rejections are expected traffic (e.g. racing cancellations).
            if matches!(e, DevnetError::Beacon(BeaconError::RequestNotFound(_))) {
                debug!(app = %target, error = %e, "Call rejected");
            } else {
                warn!(app = %target, code = e.code(), error = %e, "Call rejected");
            }
            Err(e.into())
        }
    }
}
