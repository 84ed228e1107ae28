//! Authentication providers.
//!
//! Two variants, tried in order at construction time:
//!
//! 1. [`HostTokenAuth`]: an ambient host tool (the CLI) has already
//!    negotiated a token and injected it into the environment. Detected via
//!    `STKAI_AUTH_TOKEN`; absence falls through.
//! 2. [`ClientCredentialsAuth`]: OAuth2 client-credentials flow against a
//!    configured token endpoint, with a cached `(token, expires_at)` pair.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::TransportError;

/// Default margin before expiry at which the cached token is refreshed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Supplies bearer tokens for outgoing requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns a token valid for at least the next request.
    async fn bearer_token(&self) -> Result<String, TransportError>;
}

/// Auth delegated to the ambient host tool.
///
/// The host injects a ready-to-use token into the environment; this provider
/// just hands it back.
#[derive(Debug, Clone)]
pub struct HostTokenAuth {
    token: String,
}

impl HostTokenAuth {
    /// Environment variable the host tool injects the token into.
    pub const ENV_VAR: &'static str = "STKAI_AUTH_TOKEN";

    /// Detects a host-injected token. Returns `None` when the variable is
    /// unset or empty, letting construction fall through to the
    /// self-authenticating variant.
    pub fn detect() -> Option<Self> {
        match std::env::var(Self::ENV_VAR) {
            Ok(token) if !token.is_empty() => Some(Self { token }),
            _ => None,
        }
    }

    /// Wraps an explicitly provided token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for HostTokenAuth {
    async fn bearer_token(&self) -> Result<String, TransportError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials provider with a cached token.
///
/// The cache lives behind one async mutex: when the token is within the
/// refresh margin of expiry, the first caller refreshes while concurrent
/// callers wait on the lock and then reuse the fresh token (coalesced
/// refresh).
pub struct ClientCredentialsAuth {
    client_id: String,
    client_secret: String,
    token_url: String,
    refresh_margin: Duration,
    http: reqwest::Client,
    cached: tokio::sync::Mutex<Option<CachedToken>>,
}

impl ClientCredentialsAuth {
    /// Creates a provider for the given credentials and token endpoint.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            http: reqwest::Client::new(),
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Overrides the refresh margin.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    async fn fetch_token(&self) -> Result<CachedToken, TransportError> {
        tracing::debug!(token_url = %self.token_url, "fetching client-credentials token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TransportError::Auth {
                message: format!("token endpoint unreachable: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(TransportError::Auth {
                message: format!("token endpoint returned {}", response.status()),
            });
        }

        let token: TokenResponse =
            response.json().await.map_err(|e| TransportError::Auth {
                message: format!("malformed token response: {e}"),
            })?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl AuthProvider for ClientCredentialsAuth {
    async fn bearer_token(&self) -> Result<String, TransportError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            let remaining = token.expires_at.saturating_duration_since(Instant::now());
            if remaining > self.refresh_margin {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let value = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

/// Selects an auth provider: host-delegated when the ambient token is
/// present, client credentials otherwise.
pub fn detect_provider(
    client_id: Option<&str>,
    client_secret: Option<&str>,
    token_url: &str,
) -> Result<Arc<dyn AuthProvider>, TransportError> {
    if let Some(host) = HostTokenAuth::detect() {
        tracing::debug!("using host-delegated auth token");
        return Ok(Arc::new(host));
    }

    match (client_id, client_secret) {
        (Some(id), Some(secret)) => Ok(Arc::new(ClientCredentialsAuth::new(
            id, secret, token_url,
        ))),
        _ => Err(TransportError::Auth {
            message: "no host token detected and no client credentials configured".to_string(),
        }),
    }
}
