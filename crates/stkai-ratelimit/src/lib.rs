//! Client-side rate limiting for the stkai SDK.
//!
//! Many workers in many processes share a single server-side quota. The goal
//! of this crate is to minimize client-observed failure and server-observed
//! rejection at the same time: absorb pushback gracefully, recover when load
//! eases, and fail fast when no forward progress is possible.
//!
//! Four strategies implement one narrow contract ([`RateLimiter`]):
//!
//! - **Pass-through**: no limiting; every acquire succeeds immediately.
//! - **Token bucket**: classical bucket with capacity `max_requests` refilled
//!   over `time_window`.
//! - **Adaptive (AIMD)**: token bucket whose ceiling decays multiplicatively
//!   on 429 feedback and recovers additively on success, with jittered step
//!   magnitudes so peer processes desynchronize.
//! - **Congestion-aware**: the adaptive bucket behind a Little's-Law
//!   concurrency gate driven by observed latency.
//!
//! The limiter never sleeps. [`RateLimiter::acquire`] computes how long the
//! caller must wait and returns it; the caller honors the wait outside the
//! limiter's lock. This keeps the exclusive region free of blocking
//! operations so the limiter can be shared by reference across workers.
//!
//! # Example
//!
//! ```
//! use stkai_ratelimit::{Acquire, RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::from_config(RateLimitConfig::balanced(40).build());
//! match limiter.acquire() {
//!     Acquire::Acquired { wait } => {
//!         // sleep `wait`, issue the request, then feed back the outcome:
//!         // limiter.on_success() / limiter.on_rate_limited()
//!         // and always limiter.release_concurrency()
//!         # let _ = wait;
//!     }
//!     Acquire::Timeout { .. } => {
//!         // fail fast: no permit within the configured bound
//!     }
//! }
//! ```

mod config;
mod error;
mod events;
mod limiter;

pub use config::{RateLimitConfig, RateLimitConfigBuilder, Strategy};
pub use error::RateLimitError;
pub use events::RateLimitEvent;
pub use limiter::{Acquire, LimiterSnapshot, RateLimiter};
