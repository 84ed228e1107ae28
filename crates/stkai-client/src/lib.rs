//! Client orchestrator for the stkai request-governance stack.
//!
//! Composes the three governance layers around an HTTP transport:
//!
//! ```text
//! caller ──► retry controller ──► rate limiter ──► transport ──► server
//!                  ▲                    │
//!                  └── feedback (status, latency, Retry-After) ◄──┘
//! ```
//!
//! A [`Client`] owns one shared [`RateLimiter`](stkai_ratelimit::RateLimiter)
//! and is cheap to clone across workers. [`Client::execute`] resolves one
//! request; [`Client::execute_many`] runs a batch through a bounded worker
//! pool, preserving input order. Outcomes follow the taxonomy in
//! [`OutcomeStatus`]; per-request rows land in a shared
//! [`MetricsCollector`](stkai_metrics::MetricsCollector).
//!
//! # Example
//!
//! ```no_run
//! use stkai_client::{Client, Request};
//! use stkai_ratelimit::RateLimitConfig;
//!
//! # async fn run() {
//! let client = Client::builder()
//!     .name("rqc")
//!     .endpoint("https://genai-code-buddy-api.stackspot.com/v1/quick-commands/create-execution/my-command")
//!     .rate_limit(RateLimitConfig::balanced(40).build())
//!     .build();
//!
//! let outcome = client.execute(Request::new(serde_json::json!({"prompt": "hi"}))).await;
//! if outcome.is_success() {
//!     println!("{}", outcome.body.unwrap_or_default());
//! }
//! # }
//! ```

mod client;
mod events;
mod outcome;
mod pool;
mod request;
mod scope;

pub use client::{Client, ClientBuilder};
pub use events::{RequestEvent, RequestPhase};
pub use outcome::{AttemptFailure, FailureDetail, OutcomeStatus, RequestOutcome};
pub use request::Request;
pub use scope::ConversationScope;
