//! The daemon's reconciliation loop.
//!
//! Each cycle re-reads the ledger and decides per request: wait, complete,
//! or cancel. Nothing is kept between cycles, so a restart at any point
//! simply recomputes the same decisions.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use beacon::{Address, BeaconState, Round};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{BeaconClient, ClientError};
use crate::fulfiller::{Fulfiller, Outcome, RetryPolicy};
use crate::metrics::Metrics;
use crate::vrf::Prover;

/// Decision for one pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Target round not reached yet.
    NotReady,
    Complete,
    /// Past the stale window; the ledger will accept a cancellation.
    Cancel,
}

pub fn classify(round: Round, last_round: Round, stale_request_timeout: u64) -> Action {
    if round > last_round {
        Action::NotReady
    } else if last_round - round >= stale_request_timeout {
        Action::Cancel
    } else {
        Action::Complete
    }
}

/// Tally of one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub last_round: Round,
    pub observed: usize,
    pub not_ready: usize,
    pub fulfilled: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when shutdown cut the cycle short.
    pub interrupted: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Fulfilled => self.fulfilled += 1,
            Outcome::Cancelled => self.cancelled += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Interrupted => self.interrupted = true,
        }
    }
}

pub struct Poller {
    client: Arc<dyn BeaconClient>,
    prover: Arc<Prover>,
    metrics: Arc<Metrics>,
    operator: Address,
    interval: Duration,
    retry: RetryPolicy,
}

impl Poller {
    pub fn new(
        client: Arc<dyn BeaconClient>,
        prover: Arc<Prover>,
        metrics: Arc<Metrics>,
        operator: Address,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            prover,
            metrics,
            operator,
            interval,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Confirm the beacon exists and was registered with our VRF key.
    pub async fn check_ready(&self) -> Result<BeaconState> {
        let state = self
            .client
            .beacon_state()
            .await
            .context("failed to read beacon state")?;

        let expected = self.prover.public_key();
        if state.globals.public_key != expected {
            bail!(
                "VRF key mismatch: beacon has {}, daemon holds {}",
                state.globals.public_key,
                expected
            );
        }
        if state.manager != self.operator {
            warn!(
                manager = %state.manager,
                operator = %self.operator,
                "Operator is not the beacon manager; completions will be rejected"
            );
        }
        Ok(state)
    }

    /// Run one cycle. Only failures to read the ledger abort it; per-request
    /// failures are logged and counted.
    pub async fn poll_once(&self, shutdown: &watch::Receiver<bool>) -> Result<CycleReport, ClientError> {
        let mut report = CycleReport::default();

        let state = self.client.beacon_state().await?;
        if state.globals.total_pending_requests == 0 {
            report.last_round = self.client.last_round().await?;
            self.metrics.record_cycle(report.last_round, 0);
            debug!(last_round = report.last_round, "No pending requests");
            return Ok(report);
        }

        let requests = self.client.pending_requests().await?;
        let last_round = self.client.last_round().await?;
        report.last_round = last_round;
        report.observed = requests.len();

        let fulfiller = Fulfiller::new(self.client.as_ref(), &self.prover, &self.metrics, self.retry, shutdown);
        let timeout = state.globals.stale_request_timeout;

        for request in &requests {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }
            match classify(request.round, last_round, timeout) {
                Action::NotReady => {
                    self.metrics.record_not_ready();
                    report.not_ready += 1;
                    debug!(
                        request_id = request.request_id,
                        round = request.round,
                        last_round,
                        "Target round not reached, skipping"
                    );
                }
                Action::Complete => report.record(fulfiller.fulfill(request, last_round).await),
                Action::Cancel => report.record(fulfiller.cancel(request, last_round).await),
            }
        }

        let remaining = state
            .globals
            .total_pending_requests
            .saturating_sub((report.fulfilled + report.cancelled + report.skipped) as u64);
        self.metrics.record_cycle(last_round, remaining);
        Ok(report)
    }
}

/// Run the poll loop until `shutdown` flips to `true` or its sender is dropped.
///
/// Returns an error only for a fatal startup condition.
pub async fn run_poller(poller: &Poller, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    loop {
        match poller.check_ready().await {
            Ok(state) => {
                info!(
                    manager = %state.manager,
                    pending = state.globals.total_pending_requests,
                    stale_request_timeout = state.globals.stale_request_timeout,
                    "Beacon ready"
                );
                break;
            }
            Err(e) if is_transient(&e) => {
                warn!(error = %format!("{e:#}"), "Node unavailable at startup, retrying");
                if wait_or_shutdown(poller.interval, &mut shutdown).await {
                    return Ok(());
                }
            }
            Err(e) => return Err(e),
        }
    }

    loop {
        if *shutdown.borrow() {
            break;
        }

        match poller.poll_once(&shutdown).await {
            Ok(report) if report.observed > 0 => info!(
                last_round = report.last_round,
                observed = report.observed,
                not_ready = report.not_ready,
                fulfilled = report.fulfilled,
                cancelled = report.cancelled,
                skipped = report.skipped,
                failed = report.failed,
                "Poll cycle complete"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Poll cycle failed, retrying next interval"),
        }

        if wait_or_shutdown(poller.interval, &mut shutdown).await {
            break;
        }
    }

    info!("Poller stopped");
    Ok(())
}

fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ClientError>()
        .is_some_and(ClientError::is_transient)
}

/// Sleep for `interval`; returns `true` if shutdown was requested meanwhile.
pub(crate) async fn wait_or_shutdown(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::client::{LocalClient, Receipt};
    use beacon::devnet::{application_address, Devnet};
    use beacon::vrf::{VrfProof, VrfSecretKey};
    use beacon::{AppId, RandomnessRequest, RequestId, Seed};
    use roll_dice::{request_roll, DiceGame};

    const OPERATOR: Address = Address([1; 32]);
    const PLAYER: Address = Address([4; 32]);
    const STALE_TIMEOUT: u64 = 20;

    struct Harness {
        devnet: Arc<Mutex<Devnet>>,
        beacon: AppId,
        game: AppId,
        metrics: Arc<Metrics>,
    }

    fn prover(byte: u8) -> Arc<Prover> {
        Arc::new(Prover::new(VrfSecretKey::from_bytes(&[byte; 32]).unwrap()))
    }

    fn harness(prover: &Prover) -> Harness {
        let mut devnet = Devnet::default();
        devnet.fund(OPERATOR, 100_000_000);
        let beacon = devnet
            .deploy_beacon(OPERATOR, prover.public_key(), 16, 100, STALE_TIMEOUT)
            .unwrap();
        let game = devnet
            .deploy_consumer(
                OPERATOR,
                Box::new(DiceGame::new(application_address(beacon))),
                10_000_000,
            )
            .unwrap();
        Harness {
            devnet: Arc::new(Mutex::new(devnet)),
            beacon,
            game,
            metrics: Arc::new(Metrics::new()),
        }
    }

    impl Harness {
        fn poller(&self, prover: Arc<Prover>) -> Poller {
            let client = LocalClient::new(self.devnet.clone(), self.beacon, OPERATOR);
            Poller::new(
                Arc::new(client),
                prover,
                self.metrics.clone(),
                OPERATOR,
                Duration::from_millis(10),
            )
        }

        fn roll(&self, rounds_ahead: u64) -> u64 {
            let mut devnet = self.devnet.lock().unwrap();
            request_roll(&mut devnet, self.game, self.beacon, PLAYER, rounds_ahead).unwrap()
        }

        fn advance(&self, rounds: u64) {
            self.devnet.lock().unwrap().advance_rounds(rounds);
        }

        fn pending(&self) -> usize {
            let devnet = self.devnet.lock().unwrap();
            devnet.pending_requests(self.beacon).unwrap().len()
        }

        fn settled(&self, request_id: u64) -> bool {
            let devnet = self.devnet.lock().unwrap();
            devnet
                .consumer::<DiceGame>(self.game)
                .and_then(|game| game.roll(request_id))
                .is_some()
        }
    }

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    /// Serves the ledger but never delivers a block seed.
    struct SeedOutage(LocalClient);

    #[async_trait]
    impl BeaconClient for SeedOutage {
        async fn last_round(&self) -> Result<Round, ClientError> {
            self.0.last_round().await
        }

        async fn beacon_state(&self) -> Result<BeaconState, ClientError> {
            self.0.beacon_state().await
        }

        async fn pending_requests(&self) -> Result<Vec<RandomnessRequest>, ClientError> {
            self.0.pending_requests().await
        }

        async fn block_seed(&self, _round: Round) -> Result<Seed, ClientError> {
            Err(ClientError::Transport("connection refused".into()))
        }

        async fn complete_request(&self, request_id: RequestId, proof: &VrfProof) -> Result<Receipt, ClientError> {
            self.0.complete_request(request_id, proof).await
        }

        async fn cancel_request(&self, request_id: RequestId) -> Result<Receipt, ClientError> {
            self.0.cancel_request(request_id).await
        }
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(11, 10, 5), Action::NotReady);
        assert_eq!(classify(10, 10, 5), Action::Complete);
        assert_eq!(classify(6, 10, 5), Action::Complete);
        assert_eq!(classify(5, 10, 5), Action::Cancel);
        assert_eq!(classify(0, 10, 5), Action::Cancel);
    }

    #[tokio::test]
    async fn empty_ledger_is_a_quiet_cycle() {
        let prover = prover(3);
        let h = harness(&prover);
        let (_tx, rx) = no_shutdown();

        let report = h.poller(prover).poll_once(&rx).await.unwrap();
        assert_eq!(report.observed, 0);
        assert_eq!(report.last_round, h.devnet.lock().unwrap().round());
    }

    #[tokio::test]
    async fn completes_ready_and_leaves_future_requests() {
        let prover = prover(3);
        let h = harness(&prover);
        let ready = h.roll(1);
        let future = h.roll(10);
        h.advance(2);
        let (_tx, rx) = no_shutdown();

        let report = h.poller(prover).poll_once(&rx).await.unwrap();

        assert_eq!(report.observed, 2);
        assert_eq!(report.fulfilled, 1);
        assert_eq!(report.not_ready, 1);
        assert!(h.settled(ready));
        assert!(!h.settled(future));
        assert_eq!(h.pending(), 1);
    }

    #[tokio::test]
    async fn cancels_stale_requests() {
        let prover = prover(3);
        let h = harness(&prover);
        h.roll(1);
        h.advance(1 + STALE_TIMEOUT);
        let before = h.devnet.lock().unwrap().balance(&OPERATOR);
        let (_tx, rx) = no_shutdown();

        let report = h.poller(prover).poll_once(&rx).await.unwrap();

        assert_eq!(report.cancelled, 1);
        assert_eq!(h.pending(), 0);
        let after = h.devnet.lock().unwrap().balance(&OPERATOR);
        assert_eq!(after, before, "incentive covers the cancellation fees");
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_cycle() {
        let registered = prover(3);
        let h = harness(&registered);
        let stale = h.roll(1);
        h.advance(STALE_TIMEOUT);
        let ready = h.roll(1);
        h.advance(2);
        let (_tx, rx) = no_shutdown();

        // Proofs from a foreign key are rejected; the stale request is still
        // cancelled in the same cycle.
        let report = h.poller(prover(4)).poll_once(&rx).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.cancelled, 1);
        assert!(!h.settled(ready));
        assert!(!h.settled(stale));
        assert_eq!(h.pending(), 1);
        assert_eq!(h.metrics.to_json()["requests_failed"], 1);

        // Recomputed next cycle with the right key.
        let report = h.poller(registered).poll_once(&rx).await.unwrap();
        assert_eq!(report.fulfilled, 1);
        assert!(h.settled(ready));
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_cycle() {
        let prover = prover(3);
        let h = harness(&prover);
        h.roll(1);
        h.advance(2);
        let (tx, rx) = no_shutdown();
        tx.send(true).unwrap();

        let report = h.poller(prover).poll_once(&rx).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.fulfilled, 0);
        assert_eq!(h.pending(), 1);
    }

    #[tokio::test]
    async fn key_mismatch_is_fatal_at_startup() {
        let h = harness(&prover(3));
        let (_tx, rx) = no_shutdown();

        let err = run_poller(&h.poller(prover(4)), rx).await.unwrap_err();
        assert!(err.to_string().contains("VRF key mismatch"));
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_sleep() {
        let prover = prover(3);
        let h = harness(&prover);
        let client = LocalClient::new(h.devnet.clone(), h.beacon, OPERATOR);
        let poller = Arc::new(Poller::new(
            Arc::new(client),
            prover,
            h.metrics.clone(),
            OPERATOR,
            Duration::from_secs(3600),
        ));
        let (tx, rx) = watch::channel(false);

        let task = {
            let poller = poller.clone();
            tokio::spawn(async move { run_poller(&poller, rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("poller did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert!(h.metrics.to_json()["cycles"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn shutdown_interrupts_transport_retries() {
        let prover = prover(3);
        let h = harness(&prover);
        h.roll(1);
        h.advance(2);
        let client = SeedOutage(LocalClient::new(h.devnet.clone(), h.beacon, OPERATOR));
        let poller = Arc::new(
            Poller::new(Arc::new(client), prover, h.metrics.clone(), OPERATOR, Duration::from_millis(10))
                .with_retry_policy(RetryPolicy {
                    max_retries: 5,
                    initial_delay: Duration::from_secs(10),
                }),
        );
        let (tx, rx) = watch::channel(false);

        let task = {
            let poller = poller.clone();
            tokio::spawn(async move { run_poller(&poller, rx).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("poller kept retrying after shutdown")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(h.pending(), 1);
        assert_eq!(h.metrics.to_json()["requests_failed"], 0);
    }
}
