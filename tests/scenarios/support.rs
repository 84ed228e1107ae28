//! A simulated server enforcing a shared per-minute quota.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stkai_transport::{HttpTransport, TransportError, TransportResponse};

/// Near-zero time a rejection takes compared to real processing.
const REJECTION_LATENCY: Duration = Duration::from_millis(10);

struct QuotaState {
    tokens: f64,
    last_refill: Option<tokio::time::Instant>,
}

/// Server-side token bucket driven by the (possibly paused) tokio clock.
pub struct SimulatedServer {
    quota_per_minute: f64,
    latency: Duration,
    retry_after_secs: Mutex<f64>,
    state: Mutex<QuotaState>,
    granted: AtomicU64,
    rejected: AtomicU64,
}

impl SimulatedServer {
    pub fn new(quota_per_minute: f64, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            quota_per_minute,
            latency,
            retry_after_secs: Mutex::new(5.0),
            state: Mutex::new(QuotaState {
                tokens: quota_per_minute,
                last_refill: None,
            }),
            granted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    /// Overrides the Retry-After value attached to 429 responses.
    pub fn set_retry_after(&self, secs: f64) {
        *self.retry_after_secs.lock().unwrap() = secs;
    }

    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    fn try_take(&self) -> bool {
        let now = tokio::time::Instant::now();
        let mut state = self.state.lock().unwrap();
        let last = state.last_refill.unwrap_or(now);
        let elapsed = now.saturating_duration_since(last).as_secs_f64();
        let refill_rate = self.quota_per_minute / 60.0;
        state.tokens = (state.tokens + elapsed * refill_rate).min(self.quota_per_minute);
        state.last_refill = Some(now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn ok(&self) -> TransportResponse {
        TransportResponse {
            status: 200,
            headers: HashMap::new(),
            body: "{\"result\": \"ok\"}".to_string(),
        }
    }

    fn too_many_requests(&self) -> TransportResponse {
        let mut headers = HashMap::new();
        headers.insert(
            "retry-after".to_string(),
            format!("{}", *self.retry_after_secs.lock().unwrap()),
        );
        TransportResponse {
            status: 429,
            headers,
            body: String::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for SimulatedServer {
    async fn get(
        &self,
        _url: &str,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        Ok(self.ok())
    }

    async fn post(
        &self,
        _url: &str,
        _body: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        // Quota is consumed at arrival; rejections return almost instantly
        // while granted requests pay the processing latency.
        if self.try_take() {
            tokio::time::sleep(self.latency).await;
            self.granted.fetch_add(1, Ordering::SeqCst);
            Ok(self.ok())
        } else {
            tokio::time::sleep(REJECTION_LATENCY).await;
            self.rejected.fetch_add(1, Ordering::SeqCst);
            Ok(self.too_many_requests())
        }
    }
}
