//! Shared state backend trait.

use async_trait::async_trait;

use super::descriptor::StateKeys;
use super::rules::RateLimiterConfig;
use crate::store::BackendError;

/// Trait for the shared store holding authoritative bucket state.
///
/// Implementations must run [`atomic_transition`](Self::atomic_transition) as a
/// single unit per bucket: no other caller's transition on the same keys may
/// interleave between the read and the write. Every error is treated as
/// transient by the limiter.
#[async_trait]
pub trait SharedStateBackend: Send + Sync {
    /// Run the admission transition for `config.algorithm` against the bucket
    /// stored under `keys` at time `now_millis`. Returns `true` on admit.
    async fn atomic_transition(
        &self,
        keys: &StateKeys,
        config: &RateLimiterConfig,
        now_millis: i64,
    ) -> Result<bool, BackendError>;

    /// Read a raw state value without modifying it.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
}
