//! Ratekeeper - Distributed Rate Limiting
//!
//! This crate decides in real time whether to admit a request for a key,
//! coordinating token-bucket and leaky-bucket state across service instances
//! through a shared Redis store. When the store is unreachable, decisions
//! continue against local per-key state.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod ratelimit;
pub mod store;
