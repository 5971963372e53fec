//! Caller-facing snapshot of a rate limiter.

use serde::{Deserialize, Serialize};

use super::rules::{Algorithm, RateLimiterConfig};

/// Read-only snapshot of one key's limiter.
///
/// `tokens_left` is remaining admission headroom for both algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStatus {
    pub tokens_left: u64,
    pub capacity: u64,
    pub refill_rate: u64,
    #[serde(rename = "type")]
    pub algorithm: Algorithm,
}

impl RateLimiterStatus {
    pub fn new(config: &RateLimiterConfig, tokens_left: u64) -> Self {
        Self {
            tokens_left,
            capacity: config.capacity,
            refill_rate: config.refill_rate,
            algorithm: config.algorithm,
        }
    }

    /// Status of a bucket no decision has touched yet.
    pub fn full(config: &RateLimiterConfig) -> Self {
        Self::new(config, config.capacity)
    }
}
