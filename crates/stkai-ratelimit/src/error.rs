use std::time::Duration;

/// Errors produced by the rate limiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    /// No permit could be granted within the configured `max_wait_time`.
    ///
    /// The limiter's state is untouched; the next caller sees an undisturbed
    /// bucket.
    #[error("token acquisition would wait {would_wait:?}, exceeding the configured bound")]
    AcquireTimeout {
        /// The wait the limiter computed before giving up.
        would_wait: Duration,
    },
}
