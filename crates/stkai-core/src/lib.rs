//! Core infrastructure shared by the stkai request-governance crates.
//!
//! This crate provides the two pieces of plumbing every governance component
//! relies on:
//!
//! - [`events`]: a unified listener system used by the rate limiter, the
//!   retry controller, and the client orchestrator for observability.
//! - [`jitter`]: the deterministic per-process jitter stream that
//!   desynchronizes peer processes sharing one server-side quota.
//!
//! Higher-level crates (`stkai-ratelimit`, `stkai-retry`, `stkai-client`)
//! build on these primitives; application code normally depends on them
//! only transitively.

pub mod events;
pub mod jitter;

pub use jitter::{jittered, Jitter};
