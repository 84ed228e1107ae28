use std::time::Duration;

use stkai_metrics::FailureReason;
use stkai_retry::Retryable;
use stkai_transport::TransportError;

/// Client-observed outcome taxonomy.
///
/// The orchestrator never throws for anything here: every request resolves
/// to a [`RequestOutcome`] whose status is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// A 2xx was ultimately received.
    Success,
    /// The limiter could not grant a permit within its bound even after all
    /// retries. Fast-fail: no request ever left the process.
    TokenTimeout,
    /// The server returned 429 on every attempt permitted by the policy.
    RateLimited,
    /// The server failed (5xx, 408, or connection failure) on every
    /// permitted attempt.
    ServerError,
    /// The transport timed out on the final attempt.
    Timeout,
    /// A non-retryable failure: 4xx other than the retryable set,
    /// authentication failure, malformed request.
    NonRetryable,
}

/// The originating failure carried by a non-success outcome, for diagnosis.
#[derive(Debug, Clone)]
pub enum FailureDetail {
    /// The rate limiter timed out; nothing was sent.
    TokenTimeout,
    /// The server answered with a final non-2xx status.
    HttpStatus { status: u16, body: String },
    /// The transport produced no usable response.
    Transport(TransportError),
    /// A pool worker died before producing an outcome.
    WorkerFailed { message: String },
}

/// The resolution of one logical request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// Id of the originating request.
    pub request_id: String,
    pub status: OutcomeStatus,
    /// Final HTTP status observed, if any response was obtained.
    pub status_code: Option<u16>,
    /// HTTP attempts made, including retries.
    pub attempts: u32,
    /// Total time blocked on the rate limiter.
    pub wait_time: Duration,
    /// Total time spent in retry backoff.
    pub retry_time: Duration,
    /// End-to-end elapsed time.
    pub elapsed: Duration,
    /// Response body, on success.
    pub body: Option<String>,
    /// The originating failure, on non-success.
    pub failure: Option<FailureDetail>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn is_token_timeout(&self) -> bool {
        self.status == OutcomeStatus::TokenTimeout
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == OutcomeStatus::RateLimited
    }

    pub fn is_server_error(&self) -> bool {
        self.status == OutcomeStatus::ServerError
    }

    pub fn is_timeout(&self) -> bool {
        self.status == OutcomeStatus::Timeout
    }

    /// Maps the outcome status to the metrics row failure reason.
    /// `None` exactly when the request succeeded.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.status {
            OutcomeStatus::Success => None,
            OutcomeStatus::TokenTimeout => Some(FailureReason::TokenTimeout),
            OutcomeStatus::RateLimited => Some(FailureReason::Server429),
            OutcomeStatus::ServerError
            | OutcomeStatus::Timeout
            | OutcomeStatus::NonRetryable => Some(FailureReason::ServerError),
        }
    }
}

/// One attempt's failure, as classified by the retry controller.
///
/// Token timeouts are transient by nature: the synthetic failure retries
/// without any status code. Status-carrying failures are decided by the
/// configured status set. Transport failures defer to their own
/// classification (timeouts and connection drops retry, auth does not).
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    TokenTimeout,
    Status {
        status: u16,
        retry_after: Option<f64>,
        body: String,
    },
    Transport(TransportError),
}

impl Retryable for AttemptFailure {
    fn status_code(&self) -> Option<u16> {
        match self {
            AttemptFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn retry_after_secs(&self) -> Option<f64> {
        match self {
            AttemptFailure::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            AttemptFailure::TokenTimeout => true,
            AttemptFailure::Transport(error) => error.is_transient(),
            AttemptFailure::Status { .. } => false,
        }
    }
}

impl AttemptFailure {
    /// Resolves the final outcome when this failure ends the request.
    /// `exhausted` distinguishes "ran out of attempts" from "not retryable".
    pub(crate) fn into_final(self, exhausted: bool) -> (OutcomeStatus, FailureDetail) {
        match self {
            AttemptFailure::TokenTimeout => {
                (OutcomeStatus::TokenTimeout, FailureDetail::TokenTimeout)
            }
            AttemptFailure::Status { status, body, .. } => {
                let outcome = if !exhausted {
                    OutcomeStatus::NonRetryable
                } else if status == 429 {
                    OutcomeStatus::RateLimited
                } else {
                    OutcomeStatus::ServerError
                };
                (outcome, FailureDetail::HttpStatus { status, body })
            }
            AttemptFailure::Transport(error) => {
                let outcome = match &error {
                    TransportError::Timeout { .. } => OutcomeStatus::Timeout,
                    TransportError::Connect { .. } => OutcomeStatus::ServerError,
                    TransportError::Auth { .. } => OutcomeStatus::NonRetryable,
                };
                (outcome, FailureDetail::Transport(error))
            }
        }
    }
}
