//! Devnet node.
//!
//! Runs an in-memory ledger with a beacon managed by the operator key and a
//! dice game consumer, advances rounds on a timer, and serves the node API.

use std::sync::{Arc, Mutex};

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use beacon::devnet::application_address;
use beacon_backend::config::NodeConfig;
use beacon_backend::node::{self, SharedDevnet};
use tokio::sync::watch;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    beacon_backend::init_tracing();

    let config = NodeConfig::from_env().context("invalid configuration")?;
    let (devnet, deployment) = node::bootstrap(&config).context("failed to bootstrap devnet")?;

    info!(
        beacon_app_id = %deployment.beacon,
        beacon_address = %application_address(deployment.beacon),
        game_app_id = %deployment.game,
        manager = %config.operator_key.address(),
        round = devnet.round(),
        "Devnet ready"
    );

    let shared: SharedDevnet = Arc::new(Mutex::new(devnet));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = actix_web::rt::spawn(node::run_ticker(
        shared.clone(),
        deployment,
        config.clone(),
        shutdown_rx,
    ));

    let data = web::Data::from(shared);
    info!(port = config.port, round_interval = ?config.round_interval, "Starting node API");

    HttpServer::new(move || App::new().app_data(data.clone()).configure(node::configure))
        .bind(("0.0.0.0", config.port))?
        .run()
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = ticker.await;
    Ok(())
}
