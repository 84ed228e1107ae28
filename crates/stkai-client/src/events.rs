use std::time::Instant;

use crate::outcome::OutcomeStatus;
use stkai_core::events::GovernanceEvent;

/// Lifecycle phase of a request inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Accepted, not yet attempted.
    Pending,
    /// An attempt is on the wire (or waiting on the limiter).
    InFlight,
    /// Backing off before another attempt.
    Retrying,
    /// Resolved to a final outcome.
    Finished,
}

/// Lifecycle events emitted by the client orchestrator.
///
/// Listeners are read-only observers; a panicking listener is isolated and
/// does not disturb the request.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    /// A request entered the orchestrator.
    Created {
        name: String,
        timestamp: Instant,
        request_id: String,
    },
    /// The request moved between lifecycle phases.
    StatusChanged {
        name: String,
        timestamp: Instant,
        request_id: String,
        old: RequestPhase,
        new: RequestPhase,
    },
    /// The request resolved.
    Finished {
        name: String,
        timestamp: Instant,
        request_id: String,
        status: OutcomeStatus,
        attempts: u32,
    },
}

impl GovernanceEvent for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::Created { .. } => "Created",
            RequestEvent::StatusChanged { .. } => "StatusChanged",
            RequestEvent::Finished { .. } => "Finished",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RequestEvent::Created { timestamp, .. }
            | RequestEvent::StatusChanged { timestamp, .. }
            | RequestEvent::Finished { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RequestEvent::Created { name, .. }
            | RequestEvent::StatusChanged { name, .. }
            | RequestEvent::Finished { name, .. } => name,
        }
    }
}
