use std::time::{Duration, Instant};
use stkai_core::events::GovernanceEvent;

/// Events emitted by the retry controller.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is about to be made after the given delay.
    Retry {
        name: String,
        timestamp: Instant,
        attempt: u32,
        delay: Duration,
    },
    /// The operation succeeded (on the first try or after retries).
    Success {
        name: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// All retry attempts were exhausted.
    Exhausted {
        name: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// A failure occurred but was classified as not retryable.
    IgnoredError { name: String, timestamp: Instant },
    /// A numeric `Retry-After` exceeded the cap and was ignored.
    RetryAfterSuppressed {
        name: String,
        timestamp: Instant,
        retry_after: Duration,
        cap: Duration,
    },
}

impl GovernanceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "Retry",
            RetryEvent::Success { .. } => "Success",
            RetryEvent::Exhausted { .. } => "Exhausted",
            RetryEvent::IgnoredError { .. } => "IgnoredError",
            RetryEvent::RetryAfterSuppressed { .. } => "RetryAfterSuppressed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. }
            | RetryEvent::RetryAfterSuppressed { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RetryEvent::Retry { name, .. }
            | RetryEvent::Success { name, .. }
            | RetryEvent::Exhausted { name, .. }
            | RetryEvent::IgnoredError { name, .. }
            | RetryEvent::RetryAfterSuppressed { name, .. } => name,
        }
    }
}
