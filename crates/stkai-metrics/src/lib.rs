//! Per-request metrics collection and aggregation.
//!
//! Every request the orchestrator completes appends one [`RequestMetrics`]
//! row to a shared [`MetricsCollector`]. [`MetricsCollector::aggregate`]
//! folds the rows into a [`RunSummary`]: success/failure counts broken down
//! by reason, latency percentiles, wait and retry time, throughput, RPS
//! amplification, and time-bucketed series for plotting. The offline
//! parameter sweep consumes these summaries to pick limiter parameters.
//!
//! Timestamps are seconds since the collector's origin (an arbitrary
//! per-process instant), which keeps rows compact and serializable.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Why a request ultimately failed. `None` on a metrics row means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The limiter could not grant a permit within its bound; no request
    /// ever left the process.
    TokenTimeout,
    /// The server rejected with 429 on every permitted attempt.
    #[serde(rename = "server_429")]
    Server429,
    /// The server failed (5xx or no usable response) on every permitted
    /// attempt.
    ServerError,
}

/// Metrics for a single completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub process_id: u32,
    pub request_id: u64,
    /// Seconds since the collector origin.
    pub start_time: f64,
    pub end_time: f64,
    pub success: bool,
    /// Final HTTP status, or 0 when no response was obtained.
    pub status_code: u16,
    pub attempts: u32,
    /// Seconds spent blocked on the rate limiter.
    pub wait_time: f64,
    /// Seconds spent in retry backoff.
    pub retry_time: f64,
    pub failure_reason: Option<FailureReason>,
}

impl RequestMetrics {
    /// Total wall time for the request, in seconds.
    pub fn elapsed(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A point in a time-bucketed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub time: f64,
    pub value: f64,
}

/// Aggregated statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub total_429s: usize,
    pub token_timeouts: usize,
    /// HTTP attempts including retries; drives RPS amplification.
    pub total_attempts: u64,

    pub failures_token_timeout: usize,
    pub failures_server_429: usize,
    pub failures_server_error: usize,

    /// End-to-end request latency including waits and retries, seconds.
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_mean: f64,

    pub wait_time_total: f64,
    pub wait_time_mean: f64,
    pub wait_time_p95: f64,

    pub retry_time_total: f64,
    pub retry_time_mean: f64,

    pub throughput_per_minute: f64,
    /// `total_attempts / total_requests`: the load retries impose on the
    /// server per logical request.
    pub rps_amplification: f64,

    pub success_rate_over_time: Vec<TimeSeriesPoint>,
    pub effective_rate_over_time: Vec<TimeSeriesPoint>,
    pub latency_over_time: Vec<TimeSeriesPoint>,
}

impl RunSummary {
    /// Percentage of requests that ultimately succeeded.
    pub fn success_rate(&self) -> f64 {
        percentage(self.successful_requests, self.total_requests)
    }

    /// Percentage of HTTP attempts the server rejected with 429.
    pub fn server_rejection_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        (self.total_429s as f64 / self.total_attempts as f64) * 100.0
    }

    /// Percentage of requests that ultimately failed.
    pub fn failure_rate(&self) -> f64 {
        percentage(self.failed_requests, self.total_requests)
    }

    /// Percentage of requests that failed on token acquisition.
    pub fn failure_rate_token_timeout(&self) -> f64 {
        percentage(self.failures_token_timeout, self.total_requests)
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64) * 100.0
}

/// Nearest-rank percentile over an unsorted sample.
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((pct / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[derive(Debug, Default)]
struct CollectorInner {
    requests: Vec<RequestMetrics>,
    rejection_times: Vec<f64>,
    token_timeout_times: Vec<f64>,
    effective_rates: Vec<(f64, f64)>,
    total_attempts: u64,
}

/// Collects metrics for a run. Shared by reference across workers.
pub struct MetricsCollector {
    origin: Instant,
    bucket_size: f64,
    inner: Mutex<CollectorInner>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Default width of time-series buckets, in seconds.
    pub const DEFAULT_BUCKET_SIZE: f64 = 10.0;

    pub fn new() -> Self {
        Self::with_bucket_size(Self::DEFAULT_BUCKET_SIZE)
    }

    /// Creates a collector with a custom time-series bucket width.
    pub fn with_bucket_size(bucket_size: f64) -> Self {
        Self {
            origin: Instant::now(),
            bucket_size,
            inner: Mutex::new(CollectorInner::default()),
        }
    }

    /// Seconds elapsed since the collector origin.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Appends a completed-request row.
    pub fn record_request(&self, metrics: RequestMetrics) {
        self.inner.lock().unwrap().requests.push(metrics);
    }

    /// Records one server-side 429 rejection.
    pub fn record_429(&self) {
        let now = self.now();
        self.inner.lock().unwrap().rejection_times.push(now);
    }

    /// Records one token-acquisition timeout.
    pub fn record_token_timeout(&self) {
        let now = self.now();
        self.inner.lock().unwrap().token_timeout_times.push(now);
    }

    /// Records the limiter's effective rate, for the adaptation time series.
    pub fn record_effective_rate(&self, rate: f64) {
        let now = self.now();
        self.inner.lock().unwrap().effective_rates.push((now, rate));
    }

    /// Records one HTTP attempt (including retries).
    pub fn record_attempt(&self) {
        self.inner.lock().unwrap().total_attempts += 1;
    }

    /// Number of completed-request rows so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds everything recorded so far into a [`RunSummary`].
    pub fn aggregate(&self, duration: Duration) -> RunSummary {
        let inner = self.inner.lock().unwrap();
        let duration = duration.as_secs_f64();

        let mut summary = RunSummary {
            total_requests: inner.requests.len(),
            total_429s: inner.rejection_times.len(),
            token_timeouts: inner.token_timeout_times.len(),
            total_attempts: inner.total_attempts,
            ..RunSummary::default()
        };

        if inner.requests.is_empty() {
            return summary;
        }

        summary.successful_requests = inner.requests.iter().filter(|r| r.success).count();
        summary.failed_requests = summary.total_requests - summary.successful_requests;

        for request in inner.requests.iter().filter(|r| !r.success) {
            match request.failure_reason {
                Some(FailureReason::TokenTimeout) => summary.failures_token_timeout += 1,
                Some(FailureReason::Server429) => summary.failures_server_429 += 1,
                Some(FailureReason::ServerError) => summary.failures_server_error += 1,
                None => {}
            }
        }

        let latencies: Vec<f64> = inner.requests.iter().map(|r| r.elapsed()).collect();
        summary.latency_p50 = percentile(&latencies, 50.0);
        summary.latency_p95 = percentile(&latencies, 95.0);
        summary.latency_p99 = percentile(&latencies, 99.0);
        summary.latency_mean = mean(&latencies);

        let wait_times: Vec<f64> = inner.requests.iter().map(|r| r.wait_time).collect();
        summary.wait_time_total = wait_times.iter().sum();
        summary.wait_time_mean = mean(&wait_times);
        summary.wait_time_p95 = percentile(&wait_times, 95.0);

        let retry_times: Vec<f64> = inner.requests.iter().map(|r| r.retry_time).collect();
        summary.retry_time_total = retry_times.iter().sum();
        summary.retry_time_mean = mean(&retry_times);

        if duration > 0.0 {
            summary.throughput_per_minute =
                (summary.successful_requests as f64 / duration) * 60.0;
        }
        if summary.total_attempts > 0 {
            summary.rps_amplification =
                summary.total_attempts as f64 / summary.total_requests as f64;
        }

        summary.success_rate_over_time =
            self.success_rate_series(&inner.requests, duration);
        summary.effective_rate_over_time = inner
            .effective_rates
            .iter()
            .map(|&(time, value)| TimeSeriesPoint { time, value })
            .collect();
        summary.latency_over_time = self.latency_series(&inner.requests, duration);

        summary
    }

    fn success_rate_series(
        &self,
        requests: &[RequestMetrics],
        duration: f64,
    ) -> Vec<TimeSeriesPoint> {
        self.bucketed(requests, duration, |bucket| {
            let successes = bucket.iter().filter(|r| r.success).count();
            (successes as f64 / bucket.len() as f64) * 100.0
        })
    }

    fn latency_series(&self, requests: &[RequestMetrics], duration: f64) -> Vec<TimeSeriesPoint> {
        self.bucketed(requests, duration, |bucket| {
            mean(&bucket.iter().map(|r| r.elapsed()).collect::<Vec<_>>())
        })
    }

    fn bucketed<F>(
        &self,
        requests: &[RequestMetrics],
        duration: f64,
        fold: F,
    ) -> Vec<TimeSeriesPoint>
    where
        F: Fn(&[&RequestMetrics]) -> f64,
    {
        let mut points = Vec::new();
        let mut bucket_start = 0.0;
        while bucket_start < duration {
            let bucket_end = bucket_start + self.bucket_size;
            let bucket: Vec<&RequestMetrics> = requests
                .iter()
                .filter(|r| r.end_time >= bucket_start && r.end_time < bucket_end)
                .collect();
            if !bucket.is_empty() {
                points.push(TimeSeriesPoint {
                    time: bucket_start,
                    value: fold(&bucket),
                });
            }
            bucket_start = bucket_end;
        }
        points
    }
}
