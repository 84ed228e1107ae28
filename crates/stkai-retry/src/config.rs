use crate::events::RetryEvent;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use stkai_core::events::{EventListeners, FnListener};

/// Status codes retried by default: transient server conditions only.
///
/// - 408 Request Timeout: the server closed the connection
/// - 429 Too Many Requests: rate limited; `Retry-After` is honored
/// - 500 / 502 / 503 / 504: transient server-side failures
pub const DEFAULT_RETRY_STATUS: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Default cap on honored `Retry-After` values. Larger values are treated as
/// abusive or buggy and ignored in favor of exponential backoff.
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Configuration for a retry controller. One per client; controllers are
/// constructed per request from a shared `Arc<RetryConfig>`.
pub struct RetryConfig<E> {
    pub(crate) max_retries: u32,
    pub(crate) initial_delay: Duration,
    pub(crate) jitter_factor: f64,
    pub(crate) max_retry_after: Duration,
    pub(crate) retry_on_status: HashSet<u16>,
    pub(crate) skip_predicate: Option<Predicate<E>>,
    pub(crate) retry_predicate: Option<Predicate<E>>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl<E> RetryConfig<E> {
    /// Creates a builder with the default parameters.
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }

    /// Total attempts permitted: one original plus `max_retries`.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Preset: standard exponential backoff (3 retries, 500 ms initial).
    pub fn exponential_backoff() -> RetryConfigBuilder<E> {
        Self::builder()
    }

    /// Preset: aggressive retries for latency-sensitive operations
    /// (5 retries, 250 ms initial).
    pub fn aggressive() -> RetryConfigBuilder<E> {
        Self::builder()
            .max_retries(5)
            .initial_delay(Duration::from_millis(250))
    }

    /// Preset: conservative retries for already-loaded downstreams
    /// (2 retries, 1 s initial).
    pub fn conservative() -> RetryConfigBuilder<E> {
        Self::builder()
            .max_retries(2)
            .initial_delay(Duration::from_secs(1))
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<E> {
    max_retries: u32,
    initial_delay: Duration,
    jitter_factor: f64,
    max_retry_after: Duration,
    retry_on_status: HashSet<u16>,
    skip_predicate: Option<Predicate<E>>,
    retry_predicate: Option<Predicate<E>>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryConfigBuilder<E> {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_retries: 3 (4 total attempts)
    /// - initial_delay: 500 ms, doubling per attempt
    /// - jitter_factor: 0.1
    /// - max_retry_after: 60 s
    /// - retry_on_status: 408, 429, 500, 502, 503, 504
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            jitter_factor: 0.1,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
            retry_on_status: DEFAULT_RETRY_STATUS.into_iter().collect(),
            skip_predicate: None,
            retry_predicate: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the maximum number of retries. Zero disables retries (a single
    /// attempt only).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry. Subsequent retries double it.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the jitter factor applied to every backoff delay.
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Sets the cap above which numeric `Retry-After` values are ignored.
    pub fn max_retry_after(mut self, cap: Duration) -> Self {
        self.max_retry_after = cap;
        self
    }

    /// Replaces the set of status codes that trigger a retry.
    pub fn retry_on_status<I: IntoIterator<Item = u16>>(mut self, codes: I) -> Self {
        self.retry_on_status = codes.into_iter().collect();
        self
    }

    /// Sets a predicate for failures that must never be retried.
    ///
    /// Takes precedence over every other classification rule.
    pub fn skip_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.skip_predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets a predicate for additional failure kinds to retry.
    ///
    /// Consulted after the status-code set and the transient-by-nature
    /// classification.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets the name for this controller (used in events and logs).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked before each retry, with the attempt
    /// number that failed and the delay before the next attempt.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback invoked on success with the total attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when all attempts are exhausted.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when an abusive `Retry-After` value is
    /// ignored, with the suppressed value.
    pub fn on_retry_after_suppressed<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::RetryAfterSuppressed { retry_after, .. } = event {
                f(*retry_after);
            }
        }));
        self
    }

    /// Registers a callback invoked when a failure is not retried.
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, RetryEvent::IgnoredError { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `initial_delay` is zero or `jitter_factor` is outside
    /// `[0, 1)`.
    pub fn build(self) -> RetryConfig<E> {
        assert!(
            self.initial_delay > Duration::ZERO,
            "initial_delay must be greater than 0"
        );
        assert!(
            (0.0..1.0).contains(&self.jitter_factor),
            "jitter_factor must be in [0, 1)"
        );

        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            jitter_factor: self.jitter_factor,
            max_retry_after: self.max_retry_after,
            retry_on_status: self.retry_on_status,
            skip_predicate: self.skip_predicate,
            retry_predicate: self.retry_predicate,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
