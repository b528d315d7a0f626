//! Configuration loaded from environment variables.
//!
//! Daemon, required: `APP_ID`, `VRF_SECRET_KEY`, and one of `OPERATOR_KEY`
//! or a key file at `OPERATOR_KEY_PATH`.
//! Daemon, optional: `RPC_URL`, `POLL_INTERVAL_MS`, `HTTP_PORT`,
//!                   `MAX_RETRIES`, `INITIAL_RETRY_DELAY_MS`
//!
//! Devnet node: `DEVNET_PORT`, `ROUND_INTERVAL_MS`, `SEED_LOOKBACK`,
//! `MAX_PENDING_REQUESTS`, `MAX_FUTURE_ROUNDS`, `STALE_REQUEST_TIMEOUT`,
//! `DICE_ROLL_EVERY`, plus the same key variables as the daemon.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon::vrf::VrfSecretKey;
use beacon::AppId;

use crate::txn::OperatorKey;
use crate::vrf::Prover;

/// Configuration for the beacon daemon.
#[derive(Clone)]
pub struct AppConfig {
    /// Devnet node HTTP endpoint.
    pub rpc_url: String,
    /// The beacon application to serve.
    pub app_id: AppId,
    /// Key that signs submitted calls; must be the beacon's manager.
    pub operator_key: Arc<OperatorKey>,
    /// Holder of the VRF secret registered with the beacon.
    pub prover: Arc<Prover>,
    pub poll_interval: Duration,
    /// HTTP server port for probes and metrics.
    pub http_port: u16,
    /// Attempts per submission on transport failures.
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let rpc_url = std::env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8980".into());

        let app_id_str = std::env::var("APP_ID").context("APP_ID env var must be set")?;
        let app_id = app_id_str
            .parse()
            .map(AppId)
            .with_context(|| format!("invalid APP_ID: {app_id_str}"))?;

        let operator_key = load_operator_key()?;
        let prover = load_prover()?;

        let poll_interval = Duration::from_millis(parse_env("POLL_INTERVAL_MS", 5_000));
        let http_port = parse_env("HTTP_PORT", 8080);
        let max_retries = parse_env("MAX_RETRIES", 5);
        let initial_retry_delay_ms = parse_env("INITIAL_RETRY_DELAY_MS", 500);

        Ok(Self {
            rpc_url,
            app_id,
            operator_key: Arc::new(operator_key),
            prover: Arc::new(prover),
            poll_interval,
            http_port,
            max_retries,
            initial_retry_delay_ms,
        })
    }
}

/// Configuration for the devnet node.
#[derive(Clone)]
pub struct NodeConfig {
    pub port: u16,
    pub round_interval: Duration,
    pub seed_lookback: u64,
    pub max_pending_requests: u64,
    pub max_future_rounds: u64,
    pub stale_request_timeout: u64,
    /// Submit a dice roll every N rounds; 0 disables.
    pub dice_roll_every: u64,
    /// Deploys the beacon and becomes its manager.
    pub operator_key: Arc<OperatorKey>,
    /// Source of the beacon's registered public key.
    pub prover: Arc<Prover>,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: parse_env("DEVNET_PORT", 8980),
            round_interval: Duration::from_millis(parse_env("ROUND_INTERVAL_MS", 1_000)),
            seed_lookback: parse_env("SEED_LOOKBACK", 1_000),
            max_pending_requests: parse_env("MAX_PENDING_REQUESTS", 64),
            max_future_rounds: parse_env("MAX_FUTURE_ROUNDS", 100),
            stale_request_timeout: parse_env("STALE_REQUEST_TIMEOUT", 500),
            dice_roll_every: parse_env("DICE_ROLL_EVERY", 0),
            operator_key: Arc::new(load_operator_key()?),
            prover: Arc::new(load_prover()?),
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn load_operator_key() -> Result<OperatorKey> {
    if let Ok(hex_key) = std::env::var("OPERATOR_KEY") {
        return OperatorKey::from_hex(&hex_key).context("invalid OPERATOR_KEY");
    }
    let key_path =
        std::env::var("OPERATOR_KEY_PATH").unwrap_or_else(|_| "~/.config/beacon/operator.key".into());
    let key_path = shellexpand::tilde(&key_path).to_string();
    let contents = std::fs::read_to_string(&key_path)
        .with_context(|| format!("failed to read operator key from {key_path}"))?;
    OperatorKey::from_hex(&contents).with_context(|| format!("invalid operator key in {key_path}"))
}

fn load_prover() -> Result<Prover> {
    let secret = std::env::var("VRF_SECRET_KEY").context("VRF_SECRET_KEY env var must be set")?;
    let secret = VrfSecretKey::from_hex(secret.trim()).context("invalid VRF_SECRET_KEY")?;
    Ok(Prover::new(secret))
}
