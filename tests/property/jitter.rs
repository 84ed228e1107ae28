//! Jitter stream invariants.

use proptest::prelude::*;
use stkai_core::Jitter;

/// Pearson correlation coefficient of two equal-length samples.
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[test]
fn independently_seeded_streams_decorrelate() {
    // Over a 1000-sample window, |r| < 0.1 for any two distinct process
    // seeds.
    for (seed_a, seed_b) in [(1u64, 2u64), (10, 11), (12345, 54321)] {
        let mut a = Jitter::with_seed(0.2, seed_a);
        let mut b = Jitter::with_seed(0.2, seed_b);
        let sa: Vec<f64> = (0..1000).map(|_| a.next()).collect();
        let sb: Vec<f64> = (0..1000).map(|_| b.next()).collect();
        let r = pearson(&sa, &sb);
        assert!(
            r.abs() < 0.1,
            "streams {seed_a}/{seed_b} correlate: r = {r}"
        );
    }
}

#[test]
fn identical_seeds_correlate_perfectly() {
    let mut a = Jitter::with_seed(0.2, 9);
    let mut b = Jitter::with_seed(0.2, 9);
    let sa: Vec<f64> = (0..1000).map(|_| a.next()).collect();
    let sb: Vec<f64> = (0..1000).map(|_| b.next()).collect();
    assert!((pearson(&sa, &sb) - 1.0).abs() < 1e-9);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every multiplier stays inside [1 - factor, 1 + factor].
    #[test]
    fn multipliers_stay_in_band(seed in any::<u64>(), factor in 0.0f64..0.99) {
        let mut jitter = Jitter::with_seed(factor, seed);
        for _ in 0..100 {
            let m = jitter.next();
            prop_assert!(m >= 1.0 - factor - 1e-12);
            prop_assert!(m <= 1.0 + factor + 1e-12);
        }
    }

    /// Jittered sleeps never go negative and stay within the band.
    #[test]
    fn jittered_durations_bounded(base_ms in 0u64..60_000, factor in 0.0f64..0.99) {
        let base = std::time::Duration::from_millis(base_ms);
        let jittered = stkai_core::jittered(base, factor);
        let base_secs = base.as_secs_f64();
        prop_assert!(jittered.as_secs_f64() >= (base_secs * (1.0 - factor)) - 1e-9);
        prop_assert!(jittered.as_secs_f64() <= (base_secs * (1.0 + factor)) + 1e-9);
    }
}
