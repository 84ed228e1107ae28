use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::AuthProvider;
use crate::error::TransportError;
use crate::{HttpTransport, TransportResponse};

/// The concrete transport: `reqwest` plus an [`AuthProvider`].
///
/// Any HTTP status comes back as a [`TransportResponse`]; only failures that
/// produced no response at all (timeout, connection, auth) surface as
/// [`TransportError`].
pub struct ReqwestTransport {
    http: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
}

impl ReqwestTransport {
    /// Creates a transport around the given auth provider.
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let token = self.auth.bearer_token().await?;

        let response = request
            .bearer_auth(token)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout { timeout }
                } else {
                    TransportError::Connect {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| TransportError::Connect {
            message: format!("failed to read response body: {e}"),
        })?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.send(self.http.get(url), timeout).await
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.send(self.http.post(url).json(body), timeout).await
    }
}
