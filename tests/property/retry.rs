//! Retry controller invariants.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use stkai_retry::{RetryConfig, RetryDecision, Retryable, Retrying};

#[derive(Debug, Clone)]
struct Failure {
    status: u16,
    retry_after: Option<f64>,
}

impl Retryable for Failure {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }
    fn retry_after_secs(&self) -> Option<f64> {
        self.retry_after
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Attempt bound: for any stream of failures, the controller yields at
    /// most max_retries + 1 attempts.
    #[test]
    fn attempts_bounded(
        max_retries in 0u32..8,
        statuses in proptest::collection::vec(
            prop_oneof![Just(429u16), Just(500), Just(503), Just(404)],
            1..20,
        ),
    ) {
        let config = Arc::new(
            RetryConfig::<Failure>::builder()
                .max_retries(max_retries)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
        let mut retrying = Retrying::new(config);
        let mut attempts = 0u32;
        let mut statuses = statuses.into_iter().cycle();

        while let Some(_attempt) = retrying.next_attempt() {
            attempts += 1;
            let failure = Failure {
                status: statuses.next().unwrap(),
                retry_after: None,
            };
            match retrying.on_failure(&failure) {
                RetryDecision::Retry { .. } => continue,
                RetryDecision::Exhausted | RetryDecision::NotRetryable => break,
            }
        }

        prop_assert!(attempts <= max_retries + 1);
    }

    /// Retry-After cap: any numeric hint above the cap is ignored and the
    /// wait equals the (unjittered) exponential backoff; hints at or below
    /// the cap can only raise the wait.
    #[test]
    fn retry_after_cap_enforced(
        retry_after in 0.0f64..10_000.0,
        initial_delay_ms in 1u64..2_000,
    ) {
        let initial = Duration::from_millis(initial_delay_ms);
        let config = Arc::new(
            RetryConfig::<Failure>::builder()
                .max_retries(1)
                .initial_delay(initial)
                .jitter_factor(0.0)
                .max_retry_after(Duration::from_secs(60))
                .build(),
        );
        let mut retrying = Retrying::new(config);
        retrying.next_attempt().unwrap();

        let failure = Failure { status: 429, retry_after: Some(retry_after) };
        let RetryDecision::Retry { delay } = retrying.on_failure(&failure) else {
            panic!("expected a retry decision");
        };

        if retry_after > 60.0 {
            // Suppressed: the raw header is never the wait.
            prop_assert_eq!(delay, initial);
        } else {
            prop_assert!(delay >= initial);
            prop_assert!(delay.as_secs_f64() >= retry_after - 1e-9);
            prop_assert!(delay.as_secs_f64() <= retry_after.max(initial.as_secs_f64()) + 1e-9);
        }
    }

    /// Backoff growth: with zero jitter the delays double exactly.
    #[test]
    fn backoff_is_exponential(initial_delay_ms in 1u64..1_000) {
        let initial = Duration::from_millis(initial_delay_ms);
        let config = Arc::new(
            RetryConfig::<Failure>::builder()
                .max_retries(4)
                .initial_delay(initial)
                .jitter_factor(0.0)
                .build(),
        );
        let mut retrying = Retrying::new(config);
        let mut expected = initial;

        for _ in 0..4 {
            retrying.next_attempt().unwrap();
            let failure = Failure { status: 503, retry_after: None };
            let RetryDecision::Retry { delay } = retrying.on_failure(&failure) else {
                panic!("expected a retry decision");
            };
            prop_assert_eq!(delay, expected);
            expected *= 2;
        }
    }
}
