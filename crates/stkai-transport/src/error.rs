use std::time::Duration;

/// Failures produced by an HTTP transport.
///
/// Non-2xx responses are not errors at this layer: they come back as a
/// [`TransportResponse`](crate::TransportResponse) for the orchestrator to
/// classify. A `TransportError` means no usable response was obtained.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The connection could not be established or broke mid-request.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// Credentials were missing, rejected, or could not be refreshed.
    #[error("authentication failed: {message}")]
    Auth { message: String },
}

impl TransportError {
    /// Whether this failure is transient by nature. Timeouts and connection
    /// failures are; authentication failures are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Auth { .. })
    }
}
