use crate::events::RateLimitEvent;
use std::str::FromStr;
use std::time::Duration;

use stkai_core::events::{EventListeners, FnListener};

/// Rate limiting strategy selector.
///
/// The SDK selects a strategy by a string tag in its configuration; this is
/// the tagged equivalent. Construction is a factory keyed by the tag (see
/// [`RateLimiter::from_config`](crate::RateLimiter::from_config)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No rate limiting; every acquire succeeds immediately.
    None,
    /// Fixed token bucket.
    TokenBucket,
    /// Adaptive AIMD token bucket.
    Adaptive,
    /// Adaptive bucket behind a latency-driven concurrency gate.
    CongestionAware,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Strategy::None),
            "token_bucket" => Ok(Strategy::TokenBucket),
            "adaptive" => Ok(Strategy::Adaptive),
            "congestion_aware" => Ok(Strategy::CongestionAware),
            other => Err(format!("unknown rate limit strategy: {other}")),
        }
    }
}

/// Configuration for a [`RateLimiter`](crate::RateLimiter).
///
/// Immutable after construction; the limiter captures everything it needs
/// when built.
pub struct RateLimitConfig {
    pub(crate) strategy: Strategy,
    pub(crate) max_requests: u32,
    pub(crate) time_window: Duration,
    pub(crate) max_wait_time: Option<Duration>,
    pub(crate) min_rate_floor: f64,
    pub(crate) penalty_factor: f64,
    pub(crate) recovery_factor: f64,
    pub(crate) jitter_factor: f64,
    pub(crate) max_concurrency: u32,
    pub(crate) pressure_threshold: f64,
    pub(crate) jitter_seed: Option<u64>,
    pub(crate) event_listeners: EventListeners<RateLimitEvent>,
    pub(crate) name: String,
}

impl RateLimitConfig {
    /// Creates a builder with the default (adaptive) parameters.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Preset: stability over throughput.
    ///
    /// Adaptive strategy with a deep floor (5%), heavy penalty (50%) and slow
    /// recovery (2%). Tolerates long token waits (120 s) rather than failing.
    pub fn conservative(max_requests: u32) -> RateLimitConfigBuilder {
        Self::builder()
            .strategy(Strategy::Adaptive)
            .max_requests(max_requests)
            .time_window(Duration::from_secs(60))
            .max_wait_time(Some(Duration::from_secs(120)))
            .min_rate_floor(0.05)
            .penalty_factor(0.5)
            .recovery_factor(0.02)
    }

    /// Preset: sensible defaults for mixed workloads.
    pub fn balanced(max_requests: u32) -> RateLimitConfigBuilder {
        Self::builder()
            .strategy(Strategy::Adaptive)
            .max_requests(max_requests)
            .time_window(Duration::from_secs(60))
            .max_wait_time(Some(Duration::from_secs(45)))
            .min_rate_floor(0.1)
            .penalty_factor(0.3)
            .recovery_factor(0.05)
    }

    /// Preset: throughput over stability.
    ///
    /// Shallow floor (30%), light penalty (15%), fast recovery (10%), and a
    /// short token wait (20 s) so overload surfaces quickly.
    pub fn optimistic(max_requests: u32) -> RateLimitConfigBuilder {
        Self::builder()
            .strategy(Strategy::Adaptive)
            .max_requests(max_requests)
            .time_window(Duration::from_secs(60))
            .max_wait_time(Some(Duration::from_secs(20)))
            .min_rate_floor(0.3)
            .penalty_factor(0.15)
            .recovery_factor(0.1)
    }

    /// Preset: fixed token bucket, no adaptation.
    pub fn token_bucket(max_requests: u32) -> RateLimitConfigBuilder {
        Self::builder()
            .strategy(Strategy::TokenBucket)
            .max_requests(max_requests)
            .time_window(Duration::from_secs(60))
            .max_wait_time(Some(Duration::from_secs(30)))
    }

    /// Preset: no rate limiting (retry only).
    pub fn none() -> RateLimitConfigBuilder {
        Self::builder().strategy(Strategy::None)
    }
}

/// Builder for [`RateLimitConfig`].
pub struct RateLimitConfigBuilder {
    strategy: Strategy,
    max_requests: u32,
    time_window: Duration,
    max_wait_time: Option<Duration>,
    min_rate_floor: f64,
    penalty_factor: f64,
    recovery_factor: f64,
    jitter_factor: f64,
    max_concurrency: u32,
    pressure_threshold: f64,
    jitter_seed: Option<u64>,
    event_listeners: EventListeners<RateLimitEvent>,
    name: String,
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - strategy: Adaptive
    /// - max_requests: 100 per 60 s window
    /// - max_wait_time: 30 s
    /// - min_rate_floor: 0.1, penalty_factor: 0.3, recovery_factor: 0.05
    /// - jitter_factor: 0.2
    /// - max_concurrency: 8, pressure_threshold: 2.0
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            strategy: Strategy::Adaptive,
            max_requests: 100,
            time_window: Duration::from_secs(60),
            max_wait_time: Some(Duration::from_secs(30)),
            min_rate_floor: 0.1,
            penalty_factor: 0.3,
            recovery_factor: 0.05,
            jitter_factor: 0.2,
            max_concurrency: 8,
            pressure_threshold: 2.0,
            jitter_seed: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the rate limiting strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the bucket capacity: maximum requests per time window.
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Sets the window over which the bucket capacity refills.
    pub fn time_window(mut self, window: Duration) -> Self {
        self.time_window = window;
        self
    }

    /// Sets the upper bound on token-acquisition waits.
    ///
    /// A computed wait beyond this bound makes `acquire` return
    /// [`Acquire::Timeout`](crate::Acquire::Timeout) without touching limiter
    /// state. `None` means waits are unbounded.
    pub fn max_wait_time(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait_time = max_wait;
        self
    }

    /// Sets the adaptive floor as a fraction of `max_requests`.
    ///
    /// Under persistent overload the effective rate asymptotes to
    /// `max_requests * min_rate_floor` rather than collapsing to zero.
    pub fn min_rate_floor(mut self, floor: f64) -> Self {
        self.min_rate_floor = floor;
        self
    }

    /// Sets the multiplicative decrease applied on 429 feedback.
    pub fn penalty_factor(mut self, factor: f64) -> Self {
        self.penalty_factor = factor;
        self
    }

    /// Sets the additive increase (as a fraction of `max_requests`) applied
    /// on success feedback.
    pub fn recovery_factor(mut self, factor: f64) -> Self {
        self.recovery_factor = factor;
        self
    }

    /// Sets the jitter factor applied to AIMD step magnitudes and waits.
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Sets the concurrency bound tracked by the congestion-aware strategy.
    pub fn max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the Little's-Law pressure threshold.
    ///
    /// When `effective_rate_per_sec * latency_ema` exceeds this value, the
    /// congestion-aware strategy adds a graduated backpressure wait before
    /// token acquisition. Lower values mean earlier backpressure.
    pub fn pressure_threshold(mut self, threshold: f64) -> Self {
        self.pressure_threshold = threshold;
        self
    }

    /// Pins the jitter stream seed.
    ///
    /// By default the stream is seeded from the process fingerprint. Tests
    /// and simulated peers pin the seed to model several processes inside
    /// one address space.
    pub fn jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    /// Sets the name for this limiter instance (used in events and logs).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when a permit is acquired.
    ///
    /// The callback receives the wait the caller must honor before issuing
    /// the request (zero when a token was immediately available).
    pub fn on_permit_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimitEvent::PermitAcquired { wait, .. } = event {
                f(*wait);
            }
        }));
        self
    }

    /// Registers a callback invoked when acquisition times out.
    ///
    /// The callback receives the wait that would have been required.
    pub fn on_acquire_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimitEvent::AcquireTimedOut { would_wait, .. } = event {
                f(*would_wait);
            }
        }));
        self
    }

    /// Registers a callback invoked when the effective rate is reduced after
    /// server pushback.
    pub fn on_rate_adapted<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimitEvent::RateAdapted { effective_max, .. } = event {
                f(*effective_max);
            }
        }));
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if any parameter is outside its documented domain:
    /// `max_requests` and `max_concurrency` positive, `time_window` and
    /// `pressure_threshold` positive, `min_rate_floor` in `(0, 1]`,
    /// `penalty_factor` and `recovery_factor` in `(0, 1)`, `jitter_factor`
    /// in `[0, 1)`.
    pub fn build(self) -> RateLimitConfig {
        assert!(self.max_requests > 0, "max_requests must be greater than 0");
        assert!(
            self.time_window > Duration::ZERO,
            "time_window must be greater than 0"
        );
        assert!(
            self.min_rate_floor > 0.0 && self.min_rate_floor <= 1.0,
            "min_rate_floor must be in (0, 1]"
        );
        assert!(
            self.penalty_factor > 0.0 && self.penalty_factor < 1.0,
            "penalty_factor must be in (0, 1)"
        );
        assert!(
            self.recovery_factor > 0.0 && self.recovery_factor < 1.0,
            "recovery_factor must be in (0, 1)"
        );
        assert!(
            (0.0..1.0).contains(&self.jitter_factor),
            "jitter_factor must be in [0, 1)"
        );
        assert!(
            self.max_concurrency > 0,
            "max_concurrency must be greater than 0"
        );
        assert!(
            self.pressure_threshold > 0.0,
            "pressure_threshold must be greater than 0"
        );

        RateLimitConfig {
            strategy: self.strategy,
            max_requests: self.max_requests,
            time_window: self.time_window,
            max_wait_time: self.max_wait_time,
            min_rate_floor: self.min_rate_floor,
            penalty_factor: self.penalty_factor,
            recovery_factor: self.recovery_factor,
            jitter_factor: self.jitter_factor,
            max_concurrency: self.max_concurrency,
            pressure_threshold: self.pressure_threshold,
            jitter_seed: self.jitter_seed,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
