//! Deterministic per-process jitter.
//!
//! Many peer processes share a single server-side quota. If they all back
//! off by identical amounts at identical instants, they return to service
//! simultaneously and cause another herd. The [`Jitter`] stream is seeded
//! from a stable fingerprint of (hostname, process id), so a given process
//! always draws the same sequence (reproducible for debugging) while
//! distinct processes draw uncorrelated sequences.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Multiplicative jitter stream with a per-process deterministic seed.
///
/// Exposes three draws:
/// - [`next`](Jitter::next): a multiplier in `[1 - factor, 1 + factor]`
/// - [`random`](Jitter::random): a value in `[0, 1)` for probabilistic decisions
/// - [`apply`](Jitter::apply): `v * next()`
#[derive(Debug)]
pub struct Jitter {
    factor: f64,
    rng: StdRng,
}

impl Jitter {
    /// Creates a jitter stream seeded from the process fingerprint.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is not in `[0, 1)`.
    pub fn new(factor: f64) -> Self {
        Self::with_seed(factor, process_seed())
    }

    /// Creates a jitter stream with an explicit seed.
    ///
    /// Used by tests and by simulated peers that need to model several
    /// processes inside one address space.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is not in `[0, 1)`.
    pub fn with_seed(factor: f64, seed: u64) -> Self {
        assert!(factor >= 0.0, "jitter factor must be non-negative");
        assert!(factor < 1.0, "jitter factor must be less than 1");
        Self {
            factor,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The configured jitter factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Returns a multiplier drawn uniformly from `[1 - factor, 1 + factor]`.
    pub fn next(&mut self) -> f64 {
        if self.factor == 0.0 {
            return 1.0;
        }
        self.rng.random_range(1.0 - self.factor..=1.0 + self.factor)
    }

    /// Returns a value drawn uniformly from `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Multiplies `value` by a fresh jitter multiplier.
    pub fn apply(&mut self, value: f64) -> f64 {
        value * self.next()
    }

    /// Perturbs a duration by the stream's factor, clamped non-negative.
    pub fn duration(&mut self, base: Duration) -> Duration {
        Duration::from_secs_f64((base.as_secs_f64() * self.next()).max(0.0))
    }
}

/// Perturbs a sleep duration by `±jitter_factor`, clamped non-negative.
///
/// Every sleep in the governance stack passes through this function; it is
/// the only place jitter enters timing decisions. Draws from the thread-local
/// RNG rather than a [`Jitter`] stream, so callers without a seeded stream
/// (the retry controller, pollers) still desynchronize.
pub fn jittered(base: Duration, jitter_factor: f64) -> Duration {
    let u = if jitter_factor > 0.0 {
        rand::rng().random_range(-jitter_factor..=jitter_factor)
    } else {
        0.0
    };
    Duration::from_secs_f64((base.as_secs_f64() * (1.0 + u)).max(0.0))
}

/// Stable fingerprint of (hostname, process id) used as the stream seed.
fn process_seed() -> u64 {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    let mut hasher = DefaultHasher::new();
    host.hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    hasher.finish()
}
