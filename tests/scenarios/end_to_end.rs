//! Scenario-seeded integration tests: one process, one shared limiter, one
//! simulated server, paused time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stkai_client::{Client, Request};
use stkai_ratelimit::{RateLimitConfig, Strategy};
use stkai_retry::RetryConfig;

use super::support::SimulatedServer;

fn requests(count: usize) -> Vec<Request> {
    (0..count)
        .map(|i| Request::new(serde_json::json!({ "n": i })))
        .collect()
}

/// Low contention, adaptive strategy: one worker against a server with
/// headroom. Nearly everything succeeds on the first attempt and retries
/// impose no extra load.
#[tokio::test(start_paused = true)]
async fn adaptive_low_contention_stays_clean() {
    let server = SimulatedServer::new(100.0, Duration::from_millis(200));
    let client = Client::builder()
        .name("s1")
        .endpoint("http://sim/execute")
        .transport(Arc::clone(&server) as Arc<dyn stkai_transport::HttpTransport>)
        .rate_limit(
            RateLimitConfig::balanced(40)
                .jitter_seed(11)
                .build(),
        )
        .retry(
            RetryConfig::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(500))
                .build(),
        )
        .max_workers(1)
        .build();

    let outcomes = client.execute_many(requests(100), None).await;
    let summary = client
        .collector()
        .aggregate(Duration::from_secs_f64(client.collector().now()));

    assert!(outcomes.iter().all(|o| o.is_success()));
    assert!(summary.success_rate() >= 98.0);
    assert!(summary.server_rejection_rate() <= 5.0);
    assert!(summary.rps_amplification <= 1.2);
}

/// The motivating negative case: no limiter, heavy contention. Retries
/// amplify load on the server and most attempts bounce.
#[tokio::test(start_paused = true)]
async fn unlimited_clients_storm_the_server() {
    let server = SimulatedServer::new(20.0, Duration::from_millis(200));
    let client = Client::builder()
        .name("s2")
        .endpoint("http://sim/execute")
        .transport(Arc::clone(&server) as Arc<dyn stkai_transport::HttpTransport>)
        .rate_limit(RateLimitConfig::none().build())
        .retry(
            RetryConfig::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(500))
                .build(),
        )
        .max_workers(10)
        .build();

    let outcomes = client.execute_many(requests(200), None).await;
    let summary = client
        .collector()
        .aggregate(Duration::from_secs_f64(client.collector().now()));

    assert_eq!(outcomes.len(), 200);
    assert!(summary.rps_amplification >= 2.0, "retries should amplify load");
    assert!(
        summary.server_rejection_rate() >= 50.0,
        "most attempts should bounce off the quota (got {:.1}%)",
        summary.server_rejection_rate()
    );
    assert!(summary.success_rate() < 70.0);
    assert!(server.rejected() > server.granted());
}

/// Fixed token bucket matched to the server quota: the client paces itself,
/// the server stops rejecting, and almost everything succeeds.
#[tokio::test(start_paused = true)]
async fn token_bucket_matched_to_quota() {
    let server = SimulatedServer::new(100.0, Duration::from_millis(200));
    let client = Client::builder()
        .name("s3")
        .endpoint("http://sim/execute")
        .transport(Arc::clone(&server) as Arc<dyn stkai_transport::HttpTransport>)
        .rate_limit(
            RateLimitConfig::token_bucket(100)
                .max_wait_time(Some(Duration::from_secs(30)))
                .build(),
        )
        .retry(
            RetryConfig::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(500))
                .build(),
        )
        .max_workers(10)
        .build();

    let outcomes = client.execute_many(requests(200), None).await;
    let summary = client
        .collector()
        .aggregate(Duration::from_secs_f64(client.collector().now()));

    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    assert!(
        successes as f64 / 200.0 >= 0.9,
        "expected >= 90% success, got {successes}/200"
    );
    assert!(summary.failure_rate_token_timeout() < 5.0);
    assert!(summary.rps_amplification <= 1.2);
}

/// Sustained overload across several independently-jittered limiters
/// sharing one quota: every limiter adapts downward but none collapses
/// below its floor.
#[tokio::test(start_paused = true)]
async fn adaptive_limiters_back_off_without_collapsing() {
    let server = SimulatedServer::new(50.0, Duration::from_millis(200));

    let clients: Vec<Client> = (0u64..3)
        .map(|process| {
            Client::builder()
                .name(format!("s4-p{process}"))
                .endpoint("http://sim/execute")
                .transport(Arc::clone(&server) as Arc<dyn stkai_transport::HttpTransport>)
                .rate_limit(
                    RateLimitConfig::builder()
                        .strategy(Strategy::Adaptive)
                        .max_requests(50)
                        .min_rate_floor(0.1)
                        .penalty_factor(0.3)
                        .recovery_factor(0.05)
                        .jitter_factor(0.2)
                        .jitter_seed(1000 + process)
                        .max_wait_time(Some(Duration::from_secs(120)))
                        .build(),
                )
                .retry(
                    RetryConfig::builder()
                        .max_retries(3)
                        .initial_delay(Duration::from_millis(500))
                        .build(),
                )
                .max_workers(4)
                .build()
        })
        .collect();

    let (first, second, third) = tokio::join!(
        clients[0].execute_many(requests(60), None),
        clients[1].execute_many(requests(60), None),
        clients[2].execute_many(requests(60), None),
    );
    for outcomes in [first, second, third] {
        assert_eq!(outcomes.len(), 60);
    }

    for client in &clients {
        let effective = client.limiter().effective_rate();
        assert!(effective >= 5.0, "floor violated: {effective}");
        assert!(effective < 50.0, "no adaptation happened: {effective}");
    }
}

/// Slow-server regime: the congestion-aware gate adds proactive pressure
/// waits before any 429 is incurred, and releases every slot it takes.
#[tokio::test(start_paused = true)]
async fn congestion_gate_applies_pressure_waits() {
    // Huge quota: the server never rejects, pressure comes from latency.
    let server = SimulatedServer::new(100_000.0, Duration::from_secs(2));
    let client = Client::builder()
        .name("s5")
        .endpoint("http://sim/execute")
        .transport(Arc::clone(&server) as Arc<dyn stkai_transport::HttpTransport>)
        .rate_limit(
            RateLimitConfig::builder()
                .strategy(Strategy::CongestionAware)
                .max_requests(600)
                .pressure_threshold(2.0)
                .jitter_factor(0.0)
                .jitter_seed(5)
                .max_wait_time(None)
                .build(),
        )
        .retry(RetryConfig::builder().build())
        .max_workers(2)
        .build();

    let outcomes = client.execute_many(requests(20), None).await;
    let summary = client
        .collector()
        .aggregate(Duration::from_secs_f64(client.collector().now()));

    assert!(outcomes.iter().all(|o| o.is_success()));
    // Once the latency EMA converges near 2s, pressure (10/s * 2s = 20)
    // is far above the threshold, so later acquisitions carry waits.
    assert!(summary.wait_time_total > 0.0);
    let snapshot = client.limiter().snapshot();
    assert!(snapshot.latency_ema.unwrap_or(0.0) > 1.0);
    assert_eq!(snapshot.in_flight, 0);
}

/// An abusive Retry-After is suppressed: the client waits the exponential
/// backoff, not the hour the server asked for, and surfaces a diagnostic.
#[tokio::test(start_paused = true)]
async fn abusive_retry_after_is_suppressed_with_diagnostic() {
    let server = SimulatedServer::new(0.000001, Duration::from_millis(200));
    server.set_retry_after(3600.0);

    let suppressed = Arc::new(AtomicU32::new(0));
    let suppressed_count = Arc::clone(&suppressed);

    let client = Client::builder()
        .name("s6")
        .endpoint("http://sim/execute")
        .transport(server as Arc<dyn stkai_transport::HttpTransport>)
        .rate_limit(RateLimitConfig::none().build())
        .retry(
            RetryConfig::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(500))
                .on_retry_after_suppressed(move |value| {
                    assert_eq!(value, Duration::from_secs(3600));
                    suppressed_count.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .build();

    let start = tokio::time::Instant::now();
    let outcome = client.execute(Request::new(serde_json::json!("hi"))).await;

    assert!(outcome.is_rate_limited());
    assert_eq!(outcome.attempts, 3);
    // Two retries at 0.5s and 1s (plus jitter), nowhere near 3600s each.
    assert!(start.elapsed() < Duration::from_secs(60));
    assert_eq!(suppressed.load(Ordering::SeqCst), 2);
}
