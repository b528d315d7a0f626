//! Submission of completions and cancellations.
//!
//! A completion fetches the block seed of the request's target round, proves
//! over it, and submits `complete_request`. A cancellation submits
//! `cancel_request` for a request past its stale window. The ledger pays the
//! cancellation incentive to any canceller other than the requester, so the
//! operator collects it for requests made by other accounts.
//!
//! Transport failures are retried with exponential backoff, and shutdown cuts
//! the backoff short. Ledger rejections are not retried within a cycle: the
//! request stays in the ledger and is seen again next cycle.

use std::time::{Duration, Instant};

use beacon::{RandomnessRequest, Round};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::client::{BeaconClient, ClientError, Receipt};
use crate::metrics::Metrics;
use crate::poller::wait_or_shutdown;
use crate::vrf::Prover;

/// Rejections meaning another party already settled the request.
const BENIGN_CODES: &[&str] = &["RequestNotFound"];

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// What happened to one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Fulfilled,
    Cancelled,
    /// Settled elsewhere before our call landed.
    Skipped,
    Failed,
    /// Shutdown arrived while retrying; nothing was committed.
    Interrupted,
}

/// Retry policy for transport failures. `max_retries` counts attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
        }
    }
}

/// Whether an error means there is nothing left to do for this request.
pub fn is_non_retryable(err: &ClientError) -> bool {
    err.code().is_some_and(|code| BENIGN_CODES.contains(&code))
}

/// Backoff after `delay`: doubled, capped at one minute.
pub fn next_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(MAX_RETRY_DELAY)
}

pub struct Fulfiller<'a> {
    client: &'a dyn BeaconClient,
    prover: &'a Prover,
    metrics: &'a Metrics,
    retry: RetryPolicy,
    shutdown: &'a watch::Receiver<bool>,
}

impl<'a> Fulfiller<'a> {
    pub fn new(
        client: &'a dyn BeaconClient,
        prover: &'a Prover,
        metrics: &'a Metrics,
        retry: RetryPolicy,
        shutdown: &'a watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            prover,
            metrics,
            retry,
            shutdown,
        }
    }

    /// Complete a request whose target round has been reached.
    #[instrument(skip_all, fields(request_id = request.request_id, round = request.round))]
    pub async fn fulfill(&self, request: &RandomnessRequest, last_round: Round) -> Outcome {
        let start = Instant::now();
        let lateness = request.lateness(last_round);

        info!(
            requester_app_id = %request.requester_app_id,
            requester = %request.requester_address,
            lateness,
            "Fulfilling randomness request"
        );

        match self.submit_completion(request).await {
            Ok(receipt) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                self.metrics.record_fulfillment(lateness, latency_ms);
                info!(committed_round = receipt.round, lateness, latency_ms, "Fulfilled successfully");
                Outcome::Fulfilled
            }
            Err(e) => self.handle_error("fulfill", request, lateness, e),
        }
    }

    /// Cancel a request past its stale window.
    #[instrument(skip_all, fields(request_id = request.request_id, round = request.round))]
    pub async fn cancel(&self, request: &RandomnessRequest, last_round: Round) -> Outcome {
        let lateness = request.lateness(last_round);

        warn!(lateness, "Request is stale, cancelling");

        let request_id = request.request_id;
        match self
            .with_retries(move || async move { self.client.cancel_request(request_id).await })
            .await
        {
            Ok(receipt) => {
                self.metrics.record_cancellation();
                info!(committed_round = receipt.round, "Cancelled stale request");
                Outcome::Cancelled
            }
            Err(e) => self.handle_error("cancel", request, lateness, e),
        }
    }

    async fn submit_completion(&self, request: &RandomnessRequest) -> Result<Receipt, ClientError> {
        let round = request.round;
        let seed = self
            .with_retries(move || async move { self.client.block_seed(round).await })
            .await?;
        let (proof, output) = self.prover.prove(&seed);

        info!(seed = %seed, output = %output, "Computed VRF output");

        let request_id = request.request_id;
        self.with_retries(move || async move { self.client.complete_request(request_id, &proof).await })
            .await
    }

    /// Run `op`, retrying transport failures with exponential backoff.
    ///
    /// Gives up with the last error once shutdown is requested.
    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        let mut shutdown = self.shutdown.clone();
        let mut retry_delay = self.retry.initial_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    warn!(attempt, delay = ?retry_delay, error = %e, "Transport failure, retrying");
                    if wait_or_shutdown(retry_delay, &mut shutdown).await {
                        return Err(e);
                    }
                    retry_delay = next_delay(retry_delay);
                }
                result => return result,
            }
        }
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    fn handle_error(&self, action: &str, request: &RandomnessRequest, lateness: u64, error: ClientError) -> Outcome {
        if error.is_transient() && self.shutting_down() {
            info!(
                action,
                request_id = request.request_id,
                error = %error,
                "Shutdown requested, abandoning retries"
            );
            Outcome::Interrupted
        } else if is_non_retryable(&error) {
            self.metrics.record_skip();
            warn!(
                action,
                request_id = request.request_id,
                round = request.round,
                reason = %error,
                "Skipping request (already settled)"
            );
            Outcome::Skipped
        } else {
            self.metrics.record_failure();
            error!(
                action,
                request_id = request.request_id,
                round = request.round,
                lateness,
                code = error.code().unwrap_or("none"),
                error = %error,
                "Submission failed, will retry next cycle"
            );
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use beacon::vrf::{VrfProof, VrfSecretKey};
    use beacon::{Address, AppId, BeaconState, Costs, RequestId, Seed};

    use super::*;

    /// Fails `block_seed` with a transport error a fixed number of times.
    struct FlakyClient {
        seed_failures: usize,
        seed_calls: AtomicUsize,
        complete_calls: AtomicUsize,
        cancel_calls: AtomicUsize,
        cancel_error: Option<ClientError>,
    }

    impl FlakyClient {
        fn failing_seeds(seed_failures: usize) -> Self {
            Self {
                seed_failures,
                seed_calls: AtomicUsize::new(0),
                complete_calls: AtomicUsize::new(0),
                cancel_calls: AtomicUsize::new(0),
                cancel_error: None,
            }
        }

        fn rejecting_cancels(code: &str) -> Self {
            Self {
                cancel_error: Some(ClientError::Rejected {
                    code: code.into(),
                    message: "refused".into(),
                }),
                ..Self::failing_seeds(0)
            }
        }
    }

    #[async_trait]
    impl BeaconClient for FlakyClient {
        async fn last_round(&self) -> Result<Round, ClientError> {
            Ok(10)
        }

        async fn beacon_state(&self) -> Result<BeaconState, ClientError> {
            Err(ClientError::Transport("not served".into()))
        }

        async fn pending_requests(&self) -> Result<Vec<RandomnessRequest>, ClientError> {
            Ok(Vec::new())
        }

        async fn block_seed(&self, _round: Round) -> Result<Seed, ClientError> {
            let call = self.seed_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.seed_failures {
                Err(ClientError::Transport("connection reset".into()))
            } else {
                Ok(Seed([9; 32]))
            }
        }

        async fn complete_request(&self, _request_id: RequestId, _proof: &VrfProof) -> Result<Receipt, ClientError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt { round: 11 })
        }

        async fn cancel_request(&self, _request_id: RequestId) -> Result<Receipt, ClientError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            match &self.cancel_error {
                Some(e) => Err(e.clone()),
                None => Ok(Receipt { round: 11 }),
            }
        }
    }

    fn request() -> RandomnessRequest {
        RandomnessRequest {
            request_id: 1,
            created_at: 5,
            requester_app_id: AppId(7),
            requester_address: Address([4; 32]),
            round: 8,
            costs: Costs {
                fees: 12_000,
                box_mbr: 34_500,
            },
        }
    }

    fn prover() -> Prover {
        Prover::new(VrfSecretKey::from_bytes(&[3; 32]).unwrap())
    }

    fn policy(max_retries: u32, initial_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_retried_until_success() {
        let client = FlakyClient::failing_seeds(2);
        let (prover, metrics) = (prover(), Metrics::new());
        let (_tx, rx) = watch::channel(false);
        let fulfiller = Fulfiller::new(&client, &prover, &metrics, policy(5, Duration::from_millis(100)), &rx);

        assert_eq!(fulfiller.fulfill(&request(), 10).await, Outcome::Fulfilled);
        assert_eq!(client.seed_calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_the_request() {
        let client = FlakyClient::failing_seeds(usize::MAX);
        let (prover, metrics) = (prover(), Metrics::new());
        let (_tx, rx) = watch::channel(false);
        let fulfiller = Fulfiller::new(&client, &prover, &metrics, policy(4, Duration::from_millis(100)), &rx);

        assert_eq!(fulfiller.fulfill(&request(), 10).await, Outcome::Failed);
        assert_eq!(client.seed_calls.load(Ordering::SeqCst), 4);
        assert_eq!(client.complete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.to_json()["requests_failed"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_are_not_retried() {
        let client = FlakyClient::rejecting_cancels("NotStale");
        let (prover, metrics) = (prover(), Metrics::new());
        let (_tx, rx) = watch::channel(false);
        let fulfiller = Fulfiller::new(&client, &prover, &metrics, policy(5, Duration::from_millis(100)), &rx);

        assert_eq!(fulfiller.cancel(&request(), 40).await, Outcome::Failed);
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_elsewhere_is_skipped() {
        let client = FlakyClient::rejecting_cancels("RequestNotFound");
        let (prover, metrics) = (prover(), Metrics::new());
        let (_tx, rx) = watch::channel(false);
        let fulfiller = Fulfiller::new(&client, &prover, &metrics, RetryPolicy::default(), &rx);

        assert_eq!(fulfiller.cancel(&request(), 40).await, Outcome::Skipped);
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_between_attempts() {
        let client = FlakyClient::failing_seeds(usize::MAX);
        let (prover, metrics) = (prover(), Metrics::new());
        let (_tx, rx) = watch::channel(false);
        let fulfiller = Fulfiller::new(&client, &prover, &metrics, policy(4, Duration::from_secs(1)), &rx);

        let start = tokio::time::Instant::now();
        fulfiller.fulfill(&request(), 10).await;
        // Sleeps of 1 s, 2 s and 4 s between four attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped_at_one_minute() {
        let client = FlakyClient::failing_seeds(usize::MAX);
        let (prover, metrics) = (prover(), Metrics::new());
        let (_tx, rx) = watch::channel(false);
        let fulfiller = Fulfiller::new(&client, &prover, &metrics, policy(4, Duration::from_secs(40)), &rx);

        let start = tokio::time::Instant::now();
        fulfiller.fulfill(&request(), 10).await;
        assert_eq!(start.elapsed(), Duration::from_secs(40 + 60 + 60));
    }

    #[test]
    fn next_delay_doubles_and_caps() {
        assert_eq!(next_delay(Duration::from_millis(500)), Duration::from_secs(1));
        assert_eq!(next_delay(Duration::from_secs(45)), MAX_RETRY_DELAY);
        assert_eq!(next_delay(MAX_RETRY_DELAY), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn shutdown_cuts_the_backoff_short() {
        let client = FlakyClient::failing_seeds(usize::MAX);
        let (prover, metrics) = (prover(), Metrics::new());
        let (tx, rx) = watch::channel(false);
        let fulfiller = Fulfiller::new(&client, &prover, &metrics, policy(5, Duration::from_secs(10)), &rx);

        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };
        let req = request();
        let (outcome, ()) = tokio::time::timeout(Duration::from_secs(3), async {
            tokio::join!(fulfiller.fulfill(&req, 10), stop)
        })
        .await
        .expect("retries ignored shutdown");

        assert_eq!(outcome, Outcome::Interrupted);
        assert_eq!(client.seed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.to_json()["requests_failed"], 0);
    }

    #[test]
    fn only_already_settled_is_benign() {
        let settled = ClientError::Rejected {
            code: "RequestNotFound".into(),
            message: "request 3 not found".into(),
        };
        let bad_proof = ClientError::Rejected {
            code: "InvalidProof".into(),
            message: "invalid proof".into(),
        };
        assert!(is_non_retryable(&settled));
        assert!(!is_non_retryable(&bad_proof));
        assert!(!is_non_retryable(&ClientError::Transport("timeout".into())));
        assert!(!is_non_retryable(&ClientError::SeedUnavailable(4)));
    }
}
