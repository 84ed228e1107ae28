//! Metric row serialization round-trips.

use proptest::prelude::*;
use stkai_metrics::{FailureReason, RequestMetrics};

fn failure_reason_strategy() -> impl Strategy<Value = Option<FailureReason>> {
    prop_oneof![
        Just(None),
        Just(Some(FailureReason::TokenTimeout)),
        Just(Some(FailureReason::Server429)),
        Just(Some(FailureReason::ServerError)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every row serialized to its row form and back compares equal.
    #[test]
    fn row_round_trip(
        process_id in any::<u32>(),
        request_id in any::<u64>(),
        start_time in 0.0f64..1e6,
        duration in 0.0f64..1e4,
        success in any::<bool>(),
        status_code in prop_oneof![Just(0u16), Just(200), Just(429), Just(500)],
        attempts in 1u32..16,
        wait_time in 0.0f64..1e4,
        retry_time in 0.0f64..1e4,
        failure_reason in failure_reason_strategy(),
    ) {
        let row = RequestMetrics {
            process_id,
            request_id,
            start_time,
            end_time: start_time + duration,
            success,
            status_code,
            attempts,
            wait_time,
            retry_time,
            failure_reason,
        };
        let json = serde_json::to_string(&row).unwrap();
        let decoded: RequestMetrics = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(decoded, row);
    }
}
