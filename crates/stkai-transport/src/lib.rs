//! HTTP transport abstraction for the stkai SDK.
//!
//! A deliberately narrow contract: [`HttpTransport`] exposes `get` and
//! `post` with per-request timeouts, returning either a
//! [`TransportResponse`] (any HTTP status, with headers and body) or a
//! [`TransportError`] of a well-known kind (timeout, connection, auth).
//! Status-code policy lives upstream in the orchestrator, not here.
//!
//! Two auth variants cover the supported environments (see [`auth`]):
//! host-delegated tokens injected by an ambient CLI, and OAuth2
//! client-credentials with a cached, coalesced-refresh token.

pub mod auth;
mod client;
mod error;

pub use auth::{detect_provider, AuthProvider, ClientCredentialsAuth, HostTokenAuth};
pub use client::ReqwestTransport;
pub use error::TransportError;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// A response obtained from the server, whatever its status.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keys lowercased.
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: String,
}

impl TransportResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `Retry-After` header as numeric seconds.
    ///
    /// Only the delta-seconds form is supported; the HTTP-date form is
    /// treated as absent.
    pub fn retry_after_secs(&self) -> Option<f64> {
        self.headers
            .get("retry-after")
            .and_then(|value| value.trim().parse::<f64>().ok())
    }
}

/// Minimal two-operation HTTP contract consumed by the orchestrator.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Executes an authorized GET.
    async fn get(&self, url: &str, timeout: Duration)
        -> Result<TransportResponse, TransportError>;

    /// Executes an authorized POST with a JSON body.
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}
