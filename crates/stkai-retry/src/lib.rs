//! Retry controller with exponential backoff, jitter, and honored
//! `Retry-After`.
//!
//! A [`Retrying`] controller is constructed per request from a shared
//! [`RetryConfig`]. It yields a finite sequence of attempts (at most
//! `max_retries + 1`); after each failed attempt the caller reports the
//! failure and receives a [`RetryDecision`] telling it whether to sleep and
//! go again, or give up.
//!
//! The controller never sleeps itself: the caller honors the returned delay.
//! This keeps the controller free to interleave with rate-limiter feedback
//! between attempts.
//!
//! # Classification
//!
//! A failure is retried when, in order:
//!
//! 1. it does not match the configured skip predicate, and
//! 2. if it carries an HTTP status code, the code is in the retryable set
//!    (default 408, 429, 500, 502, 503, 504) — codes outside the set are
//!    final, or
//! 3. it declares itself transient by nature
//!    ([`Retryable::is_transient`]), or
//! 4. it matches the configured retry-on predicate.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stkai_retry::{RetryConfig, RetryDecision, Retryable, Retrying};
//!
//! #[derive(Debug)]
//! struct Flaky;
//! impl Retryable for Flaky {
//!     fn is_transient(&self) -> bool {
//!         true
//!     }
//! }
//!
//! let config = Arc::new(RetryConfig::<Flaky>::builder().max_retries(2).build());
//! let mut retrying = Retrying::new(config);
//! let mut attempts = 0;
//! while let Some(_attempt) = retrying.next_attempt() {
//!     attempts += 1;
//!     match retrying.on_failure(&Flaky) {
//!         RetryDecision::Retry { delay } => {
//!             // sleep(delay) in real code
//!             let _ = delay;
//!         }
//!         RetryDecision::Exhausted | RetryDecision::NotRetryable => break,
//!     }
//! }
//! assert_eq!(attempts, 3);
//! ```

mod config;
mod events;

pub use config::{
    RetryConfig, RetryConfigBuilder, DEFAULT_MAX_RETRY_AFTER, DEFAULT_RETRY_STATUS,
};
pub use events::RetryEvent;

use std::sync::Arc;
use std::time::{Duration, Instant};

use stkai_core::jittered;

/// Classification hooks a failure type exposes to the controller.
///
/// Transport and orchestrator error types implement this so the controller
/// can route them without knowing their shape.
pub trait Retryable {
    /// The HTTP status code attached to this failure, if any.
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// A numeric `Retry-After` hint in seconds, if the server sent one.
    fn retry_after_secs(&self) -> Option<f64> {
        None
    }

    /// Whether this failure is transient by nature and should be retried
    /// regardless of configuration. In-core transient failures (token
    /// timeouts, connection drops) answer true.
    fn is_transient(&self) -> bool {
        false
    }
}

/// Metadata for one attempt in a retry loop. 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// One-based index of this attempt.
    pub number: u32,
    /// Total attempts permitted (1 original + max_retries).
    pub max_attempts: u32,
}

impl RetryAttempt {
    /// Returns true if no further attempt will follow this one.
    pub fn is_last(&self) -> bool {
        self.number >= self.max_attempts
    }
}

/// What the caller should do after reporting a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then take the next attempt.
    Retry {
        /// Backoff to honor before the next attempt.
        delay: Duration,
    },
    /// Attempts are exhausted; the last failure is final. The caller owns
    /// the originating failure and should surface it for diagnosis.
    Exhausted,
    /// The failure is not retryable; surface it immediately.
    NotRetryable,
}

/// Per-request retry state machine.
pub struct Retrying<E> {
    config: Arc<RetryConfig<E>>,
    current_attempt: u32,
}

impl<E: Retryable> Retrying<E> {
    /// Creates a controller for one request.
    pub fn new(config: Arc<RetryConfig<E>>) -> Self {
        Self {
            config,
            current_attempt: 0,
        }
    }

    /// Total attempts permitted.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts()
    }

    /// Whether retrying is enabled (`max_retries > 0`).
    pub fn enabled(&self) -> bool {
        self.config.max_retries > 0
    }

    /// Begins the next attempt, or returns `None` when the sequence is
    /// exhausted. Yields at most `max_retries + 1` attempts.
    pub fn next_attempt(&mut self) -> Option<RetryAttempt> {
        if self.current_attempt >= self.max_attempts() {
            return None;
        }
        self.current_attempt += 1;
        Some(RetryAttempt {
            number: self.current_attempt,
            max_attempts: self.max_attempts(),
        })
    }

    /// Reports that the current attempt succeeded.
    pub fn on_success(&self) {
        if self.current_attempt > 1 {
            tracing::info!(
                retry = %self.config.name,
                attempts = self.current_attempt,
                "request succeeded after retries"
            );
        }

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "stkai_retry_calls_total",
                "retry" => self.config.name.clone(),
                "result" => "success"
            )
            .increment(1);
            metrics::histogram!("stkai_retry_attempts", "retry" => self.config.name.clone())
                .record(f64::from(self.current_attempt));
        }

        self.config.event_listeners.emit(&RetryEvent::Success {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            attempts: self.current_attempt,
        });
    }

    /// Reports that the current attempt failed and decides what happens
    /// next.
    pub fn on_failure(&mut self, error: &E) -> RetryDecision {
        debug_assert!(
            self.current_attempt >= 1,
            "on_failure called before next_attempt"
        );

        if !self.should_retry(error) {
            tracing::debug!(
                retry = %self.config.name,
                "failure not retryable, surfacing immediately"
            );
            self.config.event_listeners.emit(&RetryEvent::IgnoredError {
                name: self.config.name.clone(),
                timestamp: Instant::now(),
            });
            return RetryDecision::NotRetryable;
        }

        if self.current_attempt >= self.max_attempts() {
            tracing::warn!(
                retry = %self.config.name,
                attempts = self.current_attempt,
                "retry attempts exhausted"
            );

            #[cfg(feature = "metrics")]
            metrics::counter!(
                "stkai_retry_calls_total",
                "retry" => self.config.name.clone(),
                "result" => "exhausted"
            )
            .increment(1);

            self.config.event_listeners.emit(&RetryEvent::Exhausted {
                name: self.config.name.clone(),
                timestamp: Instant::now(),
                attempts: self.current_attempt,
            });
            return RetryDecision::Exhausted;
        }

        let delay = self.backoff_delay(error);
        tracing::warn!(
            retry = %self.config.name,
            attempt = self.current_attempt,
            max_attempts = self.max_attempts(),
            delay_ms = delay.as_millis(),
            "attempt failed, retrying after delay"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "stkai_retry_attempts_total",
            "retry" => self.config.name.clone()
        )
        .increment(1);

        self.config.event_listeners.emit(&RetryEvent::Retry {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            attempt: self.current_attempt,
            delay,
        });

        RetryDecision::Retry { delay }
    }

    fn should_retry(&self, error: &E) -> bool {
        if let Some(skip) = &self.config.skip_predicate {
            if skip(error) {
                return false;
            }
        }

        // A failure with an attached status code is decided by the status
        // set alone; codes outside the set are final.
        if let Some(status) = error.status_code() {
            return self.config.retry_on_status.contains(&status);
        }

        if error.is_transient() {
            return true;
        }

        if let Some(retry_on) = &self.config.retry_predicate {
            if retry_on(error) {
                return true;
            }
        }

        false
    }

    /// Exponential backoff with jitter, possibly raised by an honored
    /// `Retry-After`.
    fn backoff_delay(&self, error: &E) -> Duration {
        // Attempt 1 -> 2^0, attempt 2 -> 2^1, ...
        let exponent = self.current_attempt.saturating_sub(1).min(31);
        let base = self.config.initial_delay.as_secs_f64() * f64::from(2u32.pow(exponent));
        let backoff = jittered(Duration::from_secs_f64(base), self.config.jitter_factor);

        if let Some(retry_after) = error.retry_after_secs() {
            let cap = self.config.max_retry_after;
            if retry_after <= cap.as_secs_f64() {
                return backoff.max(Duration::from_secs_f64(retry_after));
            }
            tracing::warn!(
                retry = %self.config.name,
                retry_after_secs = retry_after,
                cap_secs = cap.as_secs_f64(),
                "Retry-After exceeds cap, using exponential backoff instead"
            );
            self.config
                .event_listeners
                .emit(&RetryEvent::RetryAfterSuppressed {
                    name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    retry_after: Duration::from_secs_f64(retry_after),
                    cap,
                });
        }

        backoff
    }
}
