//! Beacon daemon.
//!
//! Polls the configured beacon for pending randomness requests and settles
//! them. Exits 0 on SIGINT/SIGTERM and 1 on a fatal startup error.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use beacon::AppId;
use beacon_backend::client::RpcClient;
use beacon_backend::config::AppConfig;
use beacon_backend::fulfiller::RetryPolicy;
use beacon_backend::metrics::Metrics;
use beacon_backend::poller::{run_poller, Poller};
use tokio::sync::watch;
use tracing::{error, info};

/// Shared application state accessible from HTTP handlers.
struct AppState {
    app_id: AppId,
    metrics: Arc<Metrics>,
}

/// Liveness probe.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Readiness probe with the poller's last view of the ledger.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    let metrics = data.metrics.to_json();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "app_id": data.app_id,
        "last_round": metrics["last_round"],
        "pending_requests": metrics["pending_requests"],
    }))
}

async fn metrics_report(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.metrics.to_json())
}

#[actix_web::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    beacon_backend::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    let operator = config.operator_key.address();

    info!(
        app_id = %config.app_id,
        operator = %operator,
        vrf_public_key = %config.prover.public_key(),
        "Starting beacon daemon"
    );
    info!(rpc = %config.rpc_url, poll_interval = ?config.poll_interval, "Endpoint configured");

    let client = RpcClient::new(&config.rpc_url, config.app_id, config.operator_key.clone())?;
    let metrics = Arc::new(Metrics::new());
    let poller = Poller::new(
        Arc::new(client),
        config.prover.clone(),
        metrics.clone(),
        operator,
        config.poll_interval,
    )
    .with_retry_policy(RetryPolicy {
        max_retries: config.max_retries,
        initial_delay: Duration::from_millis(config.initial_retry_delay_ms),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller_task = actix_web::rt::spawn(async move { run_poller(&poller, shutdown_rx).await });

    let state = web::Data::new(AppState {
        app_id: config.app_id,
        metrics,
    });
    info!(port = config.http_port, "Starting HTTP server");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/status", web::get().to(status))
            .route("/metrics", web::get().to(metrics_report))
    })
    .disable_signals()
    .bind(("0.0.0.0", config.http_port))?
    .run();
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    let outcome = tokio::select! {
        signal = shutdown_signal() => {
            signal.context("failed to listen for shutdown signals")?;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            poller_task.await.context("poller task failed")?
        }
        joined = &mut poller_task => joined.context("poller task failed")?,
    };

    server_handle.stop(true).await;
    let _ = server_task.await;
    outcome
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
