use std::time::{Duration, Instant};
use stkai_core::events::GovernanceEvent;

/// Events emitted by a rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimitEvent {
    /// A permit was granted, possibly with a wait the caller must honor.
    PermitAcquired {
        name: String,
        timestamp: Instant,
        wait: Duration,
    },
    /// Acquisition failed because the computed wait exceeded the bound.
    AcquireTimedOut {
        name: String,
        timestamp: Instant,
        would_wait: Duration,
    },
    /// The effective rate was reduced after server pushback.
    RateAdapted {
        name: String,
        timestamp: Instant,
        effective_max: f64,
    },
}

impl GovernanceEvent for RateLimitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimitEvent::PermitAcquired { .. } => "PermitAcquired",
            RateLimitEvent::AcquireTimedOut { .. } => "AcquireTimedOut",
            RateLimitEvent::RateAdapted { .. } => "RateAdapted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimitEvent::PermitAcquired { timestamp, .. }
            | RateLimitEvent::AcquireTimedOut { timestamp, .. }
            | RateLimitEvent::RateAdapted { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RateLimitEvent::PermitAcquired { name, .. }
            | RateLimitEvent::AcquireTimedOut { name, .. }
            | RateLimitEvent::RateAdapted { name, .. } => name,
        }
    }
}
