use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::events::{RequestEvent, RequestPhase};
use crate::outcome::{AttemptFailure, FailureDetail, OutcomeStatus, RequestOutcome};
use crate::request::Request;
use stkai_core::events::{EventListeners, FnListener};
use stkai_metrics::{MetricsCollector, RequestMetrics};
use stkai_ratelimit::{Acquire, RateLimitConfig, RateLimiter};
use stkai_retry::{RetryConfig, RetryDecision, Retrying};
use stkai_transport::{detect_provider, HttpTransport, ReqwestTransport};

/// Releases the limiter's concurrency slot when dropped.
///
/// Pairing `acquire` with `release_concurrency` must hold on every exit
/// path, including cancellation mid-request: dropping the in-flight future
/// drops the guard.
struct PermitGuard {
    limiter: Arc<RateLimiter>,
}

impl PermitGuard {
    fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        self.limiter.release_concurrency();
    }
}

/// The client orchestrator: retry around rate limiting around HTTP.
///
/// One `Client` owns one rate limiter, shared by reference across all its
/// workers; cloning the client clones handles, not state. Every logical
/// request resolves to a [`RequestOutcome`] — the orchestrator never panics
/// for anything in the outcome taxonomy.
#[derive(Clone)]
pub struct Client {
    name: String,
    endpoint: String,
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    retry: Arc<RetryConfig<AttemptFailure>>,
    collector: Arc<MetricsCollector>,
    listeners: EventListeners<RequestEvent>,
    request_timeout: Duration,
    pub(crate) max_workers: usize,
    process_id: u32,
}

impl Client {
    /// Creates a builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The limiter shared by this client's workers.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The metrics collector receiving one row per completed request.
    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Executes one logical request to completion.
    ///
    /// The full flow per attempt: acquire a permit (honoring any computed
    /// wait), issue the request, release the concurrency slot, feed the
    /// outcome back to the limiter, and let the retry controller decide
    /// whether another attempt follows.
    pub async fn execute(&self, request: Request) -> RequestOutcome {
        let started = Instant::now();
        let start_time = self.collector.now();
        let mut phase = RequestPhase::Pending;

        self.listeners.emit(&RequestEvent::Created {
            name: self.name.clone(),
            timestamp: Instant::now(),
            request_id: request.id.clone(),
        });

        let payload = request.to_input_data();
        let mut retrying = Retrying::new(Arc::clone(&self.retry));
        let mut wait_time = Duration::ZERO;
        let mut retry_time = Duration::ZERO;
        let mut attempts = 0u32;
        let mut status = OutcomeStatus::ServerError;
        let mut status_code: Option<u16> = None;
        let mut body: Option<String> = None;
        let mut failure: Option<FailureDetail> = None;

        while let Some(attempt) = retrying.next_attempt() {
            attempts = attempt.number;
            self.collector.record_attempt();
            self.change_phase(&request.id, &mut phase, RequestPhase::InFlight);

            let wait = match self.limiter.acquire() {
                Acquire::Timeout { .. } => {
                    self.collector.record_token_timeout();
                    let timed_out = AttemptFailure::TokenTimeout;
                    match retrying.on_failure(&timed_out) {
                        RetryDecision::Retry { delay } => {
                            self.change_phase(&request.id, &mut phase, RequestPhase::Retrying);
                            retry_time += delay;
                            sleep(delay).await;
                            continue;
                        }
                        _ => {
                            let (final_status, detail) = timed_out.into_final(true);
                            status = final_status;
                            failure = Some(detail);
                            break;
                        }
                    }
                }
                Acquire::Acquired { wait } => wait,
            };

            // The guard pairs with the acquire above; it releases on every
            // exit path, including cancellation of the in-flight request.
            let permit = PermitGuard::new(Arc::clone(&self.limiter));

            if wait > Duration::ZERO {
                wait_time += wait;
                sleep(wait).await;
            }

            let attempt_started = Instant::now();
            let result = self
                .transport
                .post(&self.endpoint, &payload, self.request_timeout)
                .await;
            let latency = attempt_started.elapsed();
            drop(permit);

            let attempt_failure = match result {
                Ok(response) if response.is_success() => {
                    // Latency feeds the congestion estimate on successes
                    // only; 429s return in near-zero time and would hide
                    // the pressure signal.
                    self.limiter.record_latency(latency);
                    self.limiter.on_success();
                    self.collector
                        .record_effective_rate(self.limiter.effective_rate());
                    retrying.on_success();
                    status = OutcomeStatus::Success;
                    status_code = Some(response.status);
                    body = Some(response.body);
                    break;
                }
                Ok(response) => {
                    status_code = Some(response.status);
                    if response.status == 429 {
                        self.collector.record_429();
                        self.limiter.on_rate_limited();
                        self.collector
                            .record_effective_rate(self.limiter.effective_rate());
                    }
                    AttemptFailure::Status {
                        status: response.status,
                        retry_after: response.retry_after_secs(),
                        body: response.body,
                    }
                }
                Err(error) => AttemptFailure::Transport(error),
            };

            match retrying.on_failure(&attempt_failure) {
                RetryDecision::Retry { delay } => {
                    self.change_phase(&request.id, &mut phase, RequestPhase::Retrying);
                    retry_time += delay;
                    sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    let (final_status, detail) = attempt_failure.into_final(true);
                    status = final_status;
                    failure = Some(detail);
                    break;
                }
                RetryDecision::NotRetryable => {
                    let (final_status, detail) = attempt_failure.into_final(false);
                    status = final_status;
                    failure = Some(detail);
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        let outcome = RequestOutcome {
            request_id: request.id.clone(),
            status,
            status_code,
            attempts,
            wait_time,
            retry_time,
            elapsed,
            body,
            failure,
        };

        self.collector.record_request(RequestMetrics {
            process_id: self.process_id,
            request_id: row_id(&request.id),
            start_time,
            end_time: self.collector.now(),
            success: outcome.is_success(),
            status_code: status_code.unwrap_or(0),
            attempts,
            wait_time: wait_time.as_secs_f64(),
            retry_time: retry_time.as_secs_f64(),
            failure_reason: outcome.failure_reason(),
        });

        tracing::debug!(
            client = %self.name,
            request_id = %request.id,
            status = ?outcome.status,
            attempts,
            elapsed_ms = elapsed.as_millis(),
            "request finished"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "stkai_client_requests_total",
            "client" => self.name.clone(),
            "status" => status_label(outcome.status)
        )
        .increment(1);

        self.change_phase(&request.id, &mut phase, RequestPhase::Finished);
        self.listeners.emit(&RequestEvent::Finished {
            name: self.name.clone(),
            timestamp: Instant::now(),
            request_id: request.id,
            status: outcome.status,
            attempts,
        });

        outcome
    }

    fn change_phase(&self, request_id: &str, phase: &mut RequestPhase, new: RequestPhase) {
        if *phase == new {
            return;
        }
        self.listeners.emit(&RequestEvent::StatusChanged {
            name: self.name.clone(),
            timestamp: Instant::now(),
            request_id: request_id.to_string(),
            old: *phase,
            new,
        });
        *phase = new;
    }
}

/// Stable numeric row id derived from the request id string.
fn row_id(request_id: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    request_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(feature = "metrics")]
fn status_label(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Success => "success",
        OutcomeStatus::TokenTimeout => "token_timeout",
        OutcomeStatus::RateLimited => "rate_limited",
        OutcomeStatus::ServerError => "server_error",
        OutcomeStatus::Timeout => "timeout",
        OutcomeStatus::NonRetryable => "non_retryable",
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    name: String,
    endpoint: Option<String>,
    transport: Option<Arc<dyn HttpTransport>>,
    rate_limit: Option<RateLimitConfig>,
    retry: Option<RetryConfig<AttemptFailure>>,
    collector: Option<Arc<MetricsCollector>>,
    request_timeout: Option<Duration>,
    max_workers: Option<usize>,
    listeners: EventListeners<RequestEvent>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Creates a builder. Unset knobs fall back to the process-wide
    /// configuration captured at build time.
    pub fn new() -> Self {
        Self {
            name: "stkai".to_string(),
            endpoint: None,
            transport: None,
            rate_limit: None,
            retry: None,
            collector: None,
            request_timeout: None,
            max_workers: None,
            listeners: EventListeners::new(),
        }
    }

    /// Sets the name used in events, logs and metric labels.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the endpoint all requests are posted to. Required.
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the transport. Defaults to [`ReqwestTransport`] with auth
    /// detected from the process-wide configuration.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the rate limiting configuration. Defaults to the adaptive
    /// strategy with its standard parameters.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, config: RetryConfig<AttemptFailure>) -> Self {
        self.retry = Some(config);
        self
    }

    /// Shares an existing metrics collector.
    pub fn collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Sets the per-request transport timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Bounds the worker pool used by `execute_many`.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Registers a callback for request creation.
    pub fn on_created<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let RequestEvent::Created { request_id, .. } = event {
                f(request_id);
            }
        }));
        self
    }

    /// Registers a callback for request completion.
    pub fn on_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, OutcomeStatus, u32) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let RequestEvent::Finished {
                request_id,
                status,
                attempts,
                ..
            } = event
            {
                f(request_id, *status, *attempts);
            }
        }));
        self
    }

    /// Builds the client.
    ///
    /// # Panics
    ///
    /// Panics if no endpoint was set, if `max_workers` is zero, or if no
    /// transport was provided and no credentials are configured.
    pub fn build(self) -> Client {
        let endpoint = self.endpoint.expect("client endpoint must be configured");
        let config = stkai_config::current();

        let transport = self.transport.unwrap_or_else(|| {
            let auth = detect_provider(
                config.auth.client_id.as_deref(),
                config.auth.client_secret.as_deref(),
                &config.auth.token_url,
            )
            .unwrap_or_else(|e| panic!("cannot construct transport: {e}"));
            Arc::new(ReqwestTransport::new(auth))
        });

        let rate_limit = self
            .rate_limit
            .unwrap_or_else(|| RateLimitConfig::builder().name(self.name.clone()).build());
        let retry = self.retry.unwrap_or_else(|| {
            RetryConfig::builder()
                .max_retries(config.rqc.max_retries)
                .initial_delay(Duration::from_secs_f64(config.rqc.backoff_factor))
                .name(self.name.clone())
                .build()
        });

        let max_workers = self.max_workers.unwrap_or(config.rqc.max_workers);
        assert!(max_workers > 0, "max_workers must be greater than 0");

        Client {
            name: self.name,
            endpoint,
            transport,
            limiter: Arc::new(RateLimiter::from_config(rate_limit)),
            retry: Arc::new(retry),
            collector: self
                .collector
                .unwrap_or_else(|| Arc::new(MetricsCollector::new())),
            listeners: self.listeners,
            request_timeout: self
                .request_timeout
                .unwrap_or(config.rqc.request_timeout),
            max_workers,
            process_id: std::process::id(),
        }
    }
}
