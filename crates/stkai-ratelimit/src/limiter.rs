use crate::config::{RateLimitConfig, Strategy};
use crate::error::RateLimitError;
use crate::events::RateLimitEvent;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use stkai_core::events::EventListeners;
use stkai_core::Jitter;

/// Smoothing factor for the congestion-aware latency EMA.
const LATENCY_EMA_ALPHA: f64 = 0.2;

/// Consecutive non-success feedback events after which pressure waits are
/// suspended until a fresh latency sample arrives. Under sustained 429
/// traffic the EMA describes a server that no longer exists; the AIMD floor
/// is the budget in that regime.
const STALE_FEEDBACK_LIMIT: u32 = 10;

/// Result of attempting to acquire a permit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Acquire {
    /// Permit granted. The caller must honor `wait` before issuing the
    /// request, and must call
    /// [`release_concurrency`](RateLimiter::release_concurrency) once the
    /// request completes, regardless of outcome.
    Acquired {
        /// How long to wait before issuing the request.
        wait: Duration,
    },
    /// No permit within the configured `max_wait_time`. Limiter state is
    /// untouched.
    Timeout {
        /// The wait the limiter computed before giving up.
        would_wait: Duration,
    },
}

impl Acquire {
    /// Returns true if a permit was granted.
    pub fn is_acquired(&self) -> bool {
        matches!(self, Acquire::Acquired { .. })
    }

    /// Converts the result into a `Result`, mapping `Timeout` to
    /// [`RateLimitError::AcquireTimeout`].
    pub fn ok(self) -> Result<Duration, RateLimitError> {
        match self {
            Acquire::Acquired { wait } => Ok(wait),
            Acquire::Timeout { would_wait } => Err(RateLimitError::AcquireTimeout { would_wait }),
        }
    }
}

/// Observable limiter state, for diagnostics and invariant checks.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSnapshot {
    /// Current token balance. May be negative while reservations are queued.
    pub tokens: f64,
    /// Current ceiling of the bucket (equals capacity for non-adaptive).
    pub effective_max: f64,
    /// In-flight requests tracked by the congestion-aware strategy.
    pub in_flight: u32,
    /// Smoothed request latency in seconds, if any sample was recorded.
    pub latency_ema: Option<f64>,
}

/// Token bucket state shared by the fixed and adaptive strategies.
///
/// Tokens refill continuously at `effective_max / window` per second. When
/// the bucket is empty, acquisition *reserves* a token by going into debt
/// (negative balance) and returns the wait the caller must honor. The
/// reservation deliberately leaves `last_refill` at the present: pushing it
/// into the future would corrupt refill arithmetic for other callers sharing
/// the bucket. Debt is amortized by subsequent refills.
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    window_secs: f64,
    max_wait_secs: Option<f64>,
    tokens: f64,
    last_refill: Option<Instant>,
    effective_max: f64,
    min_effective: f64,
}

impl Bucket {
    fn fixed(capacity: u32, window: Duration, max_wait: Option<Duration>) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            window_secs: window.as_secs_f64(),
            max_wait_secs: max_wait.map(|d| d.as_secs_f64()),
            tokens: capacity,
            last_refill: None,
            effective_max: capacity,
            min_effective: capacity,
        }
    }

    fn adaptive(capacity: u32, window: Duration, max_wait: Option<Duration>, floor: f64) -> Self {
        let mut bucket = Self::fixed(capacity, window, max_wait);
        bucket.min_effective = bucket.capacity * floor;
        bucket
    }

    /// Attempts to take one token at `now`, optionally jittering the
    /// computed wait. On `Timeout` no state is committed.
    fn acquire_at(&mut self, now: Instant, jitter: Option<&mut Jitter>) -> Acquire {
        let last = self.last_refill.unwrap_or(now);
        let elapsed = now.saturating_duration_since(last).as_secs_f64();
        let refill_rate = self.effective_max / self.window_secs;

        let mut tokens = self.tokens;
        if elapsed > 0.0 {
            tokens = (tokens + elapsed * refill_rate).min(self.effective_max);
        }

        if tokens >= 1.0 {
            self.tokens = tokens - 1.0;
            self.last_refill = Some(now);
            return Acquire::Acquired {
                wait: Duration::ZERO,
            };
        }

        let mut wait = (1.0 - tokens) / refill_rate;
        if let Some(jitter) = jitter {
            wait = jitter.apply(wait).max(0.0);
        }

        if let Some(max_wait) = self.max_wait_secs {
            if wait > max_wait {
                return Acquire::Timeout {
                    would_wait: Duration::from_secs_f64(wait),
                };
            }
        }

        // Reserve: deduct now, going into debt. Each queued caller sees the
        // accumulated debt and computes a proportionally longer wait.
        self.tokens = tokens - 1.0;
        self.last_refill = Some(now);
        Acquire::Acquired {
            wait: Duration::from_secs_f64(wait),
        }
    }

    /// Additive increase, jittered in magnitude.
    fn recover(&mut self, recovery_factor: f64, jitter: &mut Jitter) {
        let recovery = self.capacity * recovery_factor * jitter.next();
        self.effective_max = (self.effective_max + recovery).min(self.capacity);
    }

    /// Multiplicative decrease, jittered in magnitude. Returns the new
    /// ceiling. Tokens are re-clamped so `tokens <= effective_max` holds.
    fn penalize(&mut self, penalty_factor: f64, jitter: &mut Jitter) -> f64 {
        let penalty = penalty_factor * jitter.next();
        self.effective_max = (self.effective_max * (1.0 - penalty)).max(self.min_effective);
        self.tokens = self.tokens.min(self.effective_max);
        self.effective_max
    }
}

/// Adaptive AIMD bucket: the bucket plus the per-process jitter stream that
/// perturbs step magnitudes.
#[derive(Debug)]
struct AdaptiveState {
    bucket: Bucket,
    jitter: Jitter,
    penalty_factor: f64,
    recovery_factor: f64,
}

impl AdaptiveState {
    fn acquire_at(&mut self, now: Instant) -> Acquire {
        self.bucket.acquire_at(now, Some(&mut self.jitter))
    }
}

/// Congestion-aware state: adaptive bucket behind a Little's-Law gate.
#[derive(Debug)]
struct CongestionState {
    inner: AdaptiveState,
    pressure_threshold: f64,
    max_concurrency: u32,
    in_flight: u32,
    latency_ema: Option<f64>,
    stale_feedback: u32,
}

impl CongestionState {
    /// Extra wait derived from observed latency, before token acquisition.
    ///
    /// Little's Law: `pressure = rate * latency` estimates how many requests
    /// "want" to be in flight. Above the threshold, the wait grows with the
    /// excess: pressure at 2x threshold waits one latency cycle, 3x waits
    /// two. This is proactive backpressure applied before any 429 arrives.
    fn pressure_wait(&self) -> f64 {
        if self.stale_feedback >= STALE_FEEDBACK_LIMIT {
            return 0.0;
        }
        let Some(ema) = self.latency_ema else {
            return 0.0;
        };
        // The effective rate is expressed per minute.
        let rate_per_sec = self.inner.bucket.effective_max / 60.0;
        let pressure = rate_per_sec * ema;
        if pressure <= self.pressure_threshold {
            return 0.0;
        }
        let excess = pressure / self.pressure_threshold;
        ema * (excess - 1.0)
    }

    fn record_latency(&mut self, latency_secs: f64) {
        self.latency_ema = Some(match self.latency_ema {
            None => latency_secs,
            Some(ema) => LATENCY_EMA_ALPHA * latency_secs + (1.0 - LATENCY_EMA_ALPHA) * ema,
        });
        self.stale_feedback = 0;
    }
}

/// Strategy dispatch.
#[derive(Debug)]
enum LimiterState {
    Passthrough,
    TokenBucket(Bucket),
    Adaptive(AdaptiveState),
    CongestionAware(CongestionState),
}

/// A shareable rate limiter.
///
/// All mutable state lives behind a single mutex per instance; nothing
/// inside the lock blocks. Share the limiter by reference (`Arc`) across
/// all workers of one process. Across processes there is no coordination:
/// desynchronization comes from independently seeded jitter.
pub struct RateLimiter {
    name: String,
    nominal_rate: f64,
    state: Mutex<LimiterState>,
    listeners: EventListeners<RateLimitEvent>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("effective_rate", &self.effective_rate())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Builds a limiter from configuration. The factory is keyed by the
    /// strategy tag.
    pub fn from_config(config: RateLimitConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            metrics::describe_counter!(
                "stkai_ratelimit_permits_total",
                "Permit acquisitions by result (acquired or timeout)"
            );
            metrics::describe_histogram!(
                "stkai_ratelimit_wait_seconds",
                "Wait imposed on callers before issuing a request"
            );
        }

        let jitter = || match config.jitter_seed {
            Some(seed) => Jitter::with_seed(config.jitter_factor, seed),
            None => Jitter::new(config.jitter_factor),
        };

        let state = match config.strategy {
            Strategy::None => LimiterState::Passthrough,
            Strategy::TokenBucket => LimiterState::TokenBucket(Bucket::fixed(
                config.max_requests,
                config.time_window,
                config.max_wait_time,
            )),
            Strategy::Adaptive => LimiterState::Adaptive(AdaptiveState {
                bucket: Bucket::adaptive(
                    config.max_requests,
                    config.time_window,
                    config.max_wait_time,
                    config.min_rate_floor,
                ),
                jitter: jitter(),
                penalty_factor: config.penalty_factor,
                recovery_factor: config.recovery_factor,
            }),
            Strategy::CongestionAware => LimiterState::CongestionAware(CongestionState {
                inner: AdaptiveState {
                    bucket: Bucket::adaptive(
                        config.max_requests,
                        config.time_window,
                        config.max_wait_time,
                        config.min_rate_floor,
                    ),
                    jitter: jitter(),
                    penalty_factor: config.penalty_factor,
                    recovery_factor: config.recovery_factor,
                },
                pressure_threshold: config.pressure_threshold,
                max_concurrency: config.max_concurrency,
                in_flight: 0,
                latency_ema: None,
                stale_feedback: 0,
            }),
        };

        Self {
            name: config.name,
            nominal_rate: f64::from(config.max_requests),
            state: Mutex::new(state),
            listeners: config.event_listeners,
        }
    }

    /// The name of this limiter instance.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempts to acquire one permit at the current instant.
    pub fn acquire(&self) -> Acquire {
        self.acquire_at(Instant::now())
    }

    /// Attempts to acquire one permit at `now`.
    ///
    /// Taking the instant as an argument keeps the refill arithmetic
    /// deterministic under test; production callers use
    /// [`acquire`](Self::acquire).
    pub fn acquire_at(&self, now: Instant) -> Acquire {
        let result = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                LimiterState::Passthrough => Acquire::Acquired {
                    wait: Duration::ZERO,
                },
                LimiterState::TokenBucket(bucket) => bucket.acquire_at(now, None),
                LimiterState::Adaptive(adaptive) => adaptive.acquire_at(now),
                LimiterState::CongestionAware(congestion) => {
                    let pressure_wait = congestion.pressure_wait();
                    match congestion.inner.acquire_at(now) {
                        Acquire::Acquired { wait } => {
                            congestion.in_flight += 1;
                            if congestion.in_flight > congestion.max_concurrency {
                                tracing::debug!(
                                    limiter = %self.name,
                                    in_flight = congestion.in_flight,
                                    max_concurrency = congestion.max_concurrency,
                                    "in-flight count above configured concurrency"
                                );
                            }
                            Acquire::Acquired {
                                wait: wait + Duration::from_secs_f64(pressure_wait),
                            }
                        }
                        timeout => timeout,
                    }
                }
            }
        };

        match result {
            Acquire::Acquired { wait } => {
                #[cfg(feature = "metrics")]
                {
                    metrics::counter!(
                        "stkai_ratelimit_permits_total",
                        "limiter" => self.name.clone(),
                        "result" => "acquired"
                    )
                    .increment(1);
                    metrics::histogram!(
                        "stkai_ratelimit_wait_seconds",
                        "limiter" => self.name.clone()
                    )
                    .record(wait.as_secs_f64());
                }

                self.listeners.emit(&RateLimitEvent::PermitAcquired {
                    name: self.name.clone(),
                    timestamp: Instant::now(),
                    wait,
                });
            }
            Acquire::Timeout { would_wait } => {
                tracing::debug!(
                    limiter = %self.name,
                    would_wait_secs = would_wait.as_secs_f64(),
                    "token acquisition timed out"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "stkai_ratelimit_permits_total",
                    "limiter" => self.name.clone(),
                    "result" => "timeout"
                )
                .increment(1);

                self.listeners.emit(&RateLimitEvent::AcquireTimedOut {
                    name: self.name.clone(),
                    timestamp: Instant::now(),
                    would_wait,
                });
            }
        }

        result
    }

    /// Feedback hook: a request completed with 2xx.
    pub fn on_success(&self) {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            LimiterState::Passthrough | LimiterState::TokenBucket(_) => {}
            LimiterState::Adaptive(adaptive) => {
                let factor = adaptive.recovery_factor;
                adaptive.bucket.recover(factor, &mut adaptive.jitter);
            }
            LimiterState::CongestionAware(congestion) => {
                let factor = congestion.inner.recovery_factor;
                congestion
                    .inner
                    .bucket
                    .recover(factor, &mut congestion.inner.jitter);
            }
        }
    }

    /// Feedback hook: the server answered 429.
    pub fn on_rate_limited(&self) {
        let adapted = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                LimiterState::Passthrough | LimiterState::TokenBucket(_) => None,
                LimiterState::Adaptive(adaptive) => {
                    let factor = adaptive.penalty_factor;
                    Some(adaptive.bucket.penalize(factor, &mut adaptive.jitter))
                }
                LimiterState::CongestionAware(congestion) => {
                    congestion.stale_feedback = congestion.stale_feedback.saturating_add(1);
                    let factor = congestion.inner.penalty_factor;
                    Some(
                        congestion
                            .inner
                            .bucket
                            .penalize(factor, &mut congestion.inner.jitter),
                    )
                }
            }
        };

        if let Some(effective_max) = adapted {
            tracing::warn!(
                limiter = %self.name,
                effective_max,
                "rate limit adapted after server pushback"
            );
            self.listeners.emit(&RateLimitEvent::RateAdapted {
                name: self.name.clone(),
                timestamp: Instant::now(),
                effective_max,
            });
        }
    }

    /// Records the latency of a successful response.
    ///
    /// Only successes contribute: 429 rejections return in near-zero time
    /// and would depress the estimate, hiding the pressure signal.
    pub fn record_latency(&self, latency: Duration) {
        let mut state = self.state.lock().unwrap();
        if let LimiterState::CongestionAware(congestion) = &mut *state {
            congestion.record_latency(latency.as_secs_f64());
        }
    }

    /// Releases the concurrency slot paired with an `Acquired` result.
    ///
    /// Idempotent: over-release clamps at zero.
    pub fn release_concurrency(&self) {
        let mut state = self.state.lock().unwrap();
        if let LimiterState::CongestionAware(congestion) = &mut *state {
            congestion.in_flight = congestion.in_flight.saturating_sub(1);
        }
    }

    /// The limiter's current ceiling, in requests per time window.
    pub fn effective_rate(&self) -> f64 {
        let state = self.state.lock().unwrap();
        match &*state {
            LimiterState::Passthrough => self.nominal_rate,
            LimiterState::TokenBucket(bucket) => bucket.effective_max,
            LimiterState::Adaptive(adaptive) => adaptive.bucket.effective_max,
            LimiterState::CongestionAware(congestion) => congestion.inner.bucket.effective_max,
        }
    }

    /// Snapshot of the observable state, for diagnostics and invariant
    /// checks.
    pub fn snapshot(&self) -> LimiterSnapshot {
        let state = self.state.lock().unwrap();
        match &*state {
            LimiterState::Passthrough => LimiterSnapshot {
                tokens: self.nominal_rate,
                effective_max: self.nominal_rate,
                in_flight: 0,
                latency_ema: None,
            },
            LimiterState::TokenBucket(bucket) => LimiterSnapshot {
                tokens: bucket.tokens,
                effective_max: bucket.effective_max,
                in_flight: 0,
                latency_ema: None,
            },
            LimiterState::Adaptive(adaptive) => LimiterSnapshot {
                tokens: adaptive.bucket.tokens,
                effective_max: adaptive.bucket.effective_max,
                in_flight: 0,
                latency_ema: None,
            },
            LimiterState::CongestionAware(congestion) => LimiterSnapshot {
                tokens: congestion.inner.bucket.tokens,
                effective_max: congestion.inner.bucket.effective_max,
                in_flight: congestion.in_flight,
                latency_ema: congestion.latency_ema,
            },
        }
    }
}
