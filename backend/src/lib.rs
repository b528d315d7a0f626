//! Randomness beacon daemon and devnet node.
//!
//! The daemon polls a beacon's request ledger and settles each request:
//!
//! - **Poller**: reads pending requests each interval and classifies them
//!   by round readiness.
//! - **Fulfiller**: proves over the target round's block seed and submits
//!   `complete_request`, or cancels requests past their stale window.
//! - **HTTP server**: liveness (`/health`), status (`/status`) and
//!   `/metrics`.
//!
//! The devnet node ([`node`]) serves an in-memory ledger over HTTP so the
//! daemon can run against it end to end.

pub mod api;
pub mod client;
pub mod config;
pub mod fulfiller;
pub mod metrics;
pub mod node;
pub mod poller;
pub mod txn;
pub mod vrf;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,actix_server=warn,hyper=warn,reqwest=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();
}
