//! Rate limiter invariants under random operation sequences.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use stkai_ratelimit::{Acquire, RateLimitConfig, RateLimiter, Strategy as LimiterStrategy};

#[derive(Debug, Clone)]
enum Op {
    Acquire { advance_ms: u64 },
    Success,
    RateLimited,
    Latency { ms: u64 },
    Release,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..5_000).prop_map(|advance_ms| Op::Acquire { advance_ms }),
        Just(Op::Success),
        Just(Op::RateLimited),
        (1u64..2_000).prop_map(|ms| Op::Latency { ms }),
        Just(Op::Release),
    ]
}

fn adaptive(max_requests: u32, floor: f64, strategy: LimiterStrategy) -> RateLimiter {
    RateLimiter::from_config(
        RateLimitConfig::builder()
            .strategy(strategy)
            .max_requests(max_requests)
            .time_window(Duration::from_secs(60))
            .max_wait_time(Some(Duration::from_secs(30)))
            .min_rate_floor(floor)
            .jitter_seed(42)
            .build(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// No-overflow: tokens never exceed the current ceiling at any
    /// observable moment, across any op sequence.
    #[test]
    fn tokens_never_exceed_effective_max(
        ops in proptest::collection::vec(op_strategy(), 1..200),
        max_requests in 1u32..200,
    ) {
        let limiter = adaptive(max_requests, 0.1, LimiterStrategy::Adaptive);
        let mut now = Instant::now();
        for op in ops {
            match op {
                Op::Acquire { advance_ms } => {
                    now += Duration::from_millis(advance_ms);
                    let _ = limiter.acquire_at(now);
                }
                Op::Success => limiter.on_success(),
                Op::RateLimited => limiter.on_rate_limited(),
                Op::Latency { ms } => limiter.record_latency(Duration::from_millis(ms)),
                Op::Release => limiter.release_concurrency(),
            }
            let snapshot = limiter.snapshot();
            prop_assert!(
                snapshot.tokens <= snapshot.effective_max + 1e-9,
                "tokens {} exceed ceiling {}",
                snapshot.tokens,
                snapshot.effective_max
            );
        }
    }

    /// Floor: the ceiling never drops below max_requests * min_rate_floor,
    /// and never rises above max_requests, after any feedback sequence.
    #[test]
    fn effective_max_respects_floor_and_ceiling(
        ops in proptest::collection::vec(op_strategy(), 1..300),
        max_requests in 1u32..500,
        floor in 0.01f64..1.0,
    ) {
        let limiter = adaptive(max_requests, floor, LimiterStrategy::Adaptive);
        let min_effective = f64::from(max_requests) * floor;
        let mut now = Instant::now();
        for op in ops {
            match op {
                Op::Acquire { advance_ms } => {
                    now += Duration::from_millis(advance_ms);
                    let _ = limiter.acquire_at(now);
                }
                Op::Success => limiter.on_success(),
                Op::RateLimited => limiter.on_rate_limited(),
                Op::Latency { ms } => limiter.record_latency(Duration::from_millis(ms)),
                Op::Release => limiter.release_concurrency(),
            }
            let snapshot = limiter.snapshot();
            prop_assert!(snapshot.effective_max >= min_effective - 1e-9);
            prop_assert!(snapshot.effective_max <= f64::from(max_requests) + 1e-9);
        }
    }

    /// Monotone refill: with no intervening feedback, the ceiling never
    /// decreases between observations.
    #[test]
    fn acquires_never_lower_the_ceiling(
        advances in proptest::collection::vec(0u64..10_000, 1..100),
    ) {
        let limiter = adaptive(50, 0.1, LimiterStrategy::Adaptive);
        // Establish a mid-range ceiling first.
        limiter.on_rate_limited();
        let mut previous = limiter.snapshot().effective_max;
        let mut now = Instant::now();
        for advance_ms in advances {
            now += Duration::from_millis(advance_ms);
            let _ = limiter.acquire_at(now);
            let current = limiter.snapshot().effective_max;
            prop_assert!(current >= previous - 1e-12);
            previous = current;
        }
    }

    /// Timeout purity: a TIMEOUT result leaves the limiter state exactly as
    /// it was before the call.
    #[test]
    fn timeout_mutates_nothing(
        drains in 1u32..50,
        advance_ms in 0u64..1_000,
    ) {
        let limiter = RateLimiter::from_config(
            RateLimitConfig::builder()
                .strategy(LimiterStrategy::TokenBucket)
                .max_requests(drains)
                .time_window(Duration::from_secs(3600))
                .max_wait_time(Some(Duration::from_millis(1)))
                .build(),
        );
        let mut now = Instant::now();
        // Drain the bucket completely.
        for _ in 0..drains {
            prop_assert!(limiter.acquire_at(now).is_acquired());
        }
        now += Duration::from_millis(advance_ms);

        // With a 1h window the next token is far beyond the 1ms bound, so
        // every further acquire must time out and must not disturb state.
        let before = limiter.snapshot();
        for _ in 0..3 {
            let result = limiter.acquire_at(now);
            prop_assert!(matches!(result, Acquire::Timeout { .. }), "expected Acquire::Timeout");
            prop_assert_eq!(limiter.snapshot(), before.clone());
        }
    }

    /// Release idempotence: any interleaving of acquires and releases keeps
    /// the in-flight counter non-negative and consistent.
    #[test]
    fn release_never_underflows(
        ops in proptest::collection::vec(proptest::bool::ANY, 1..200),
    ) {
        let limiter = adaptive(100, 0.1, LimiterStrategy::CongestionAware);
        let mut now = Instant::now();
        let mut expected: i64 = 0;
        for is_acquire in ops {
            if is_acquire {
                now += Duration::from_millis(700);
                if limiter.acquire_at(now).is_acquired() {
                    expected += 1;
                }
            } else {
                limiter.release_concurrency();
                expected = (expected - 1).max(0);
            }
            prop_assert_eq!(i64::from(limiter.snapshot().in_flight), expected);
        }
    }
}
