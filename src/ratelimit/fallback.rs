//! Local fallback state used while the shared backend is unreachable.
//!
//! Fallback state is an independent timeline: it is never seeded from, nor
//! written back to, the shared backend.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::bucket::BucketState;
use super::descriptor::scope;
use super::rules::RateLimiterConfig;

/// Per-bucket in-memory state with per-bucket locking.
///
/// The outer map is only touched to find or create a bucket; the transition
/// itself runs under that bucket's own mutex, so unrelated keys never wait on
/// each other. Entries are never evicted.
#[derive(Default)]
pub struct LocalFallbackStore {
    buckets: DashMap<String, Arc<Mutex<BucketState>>>,
}

impl LocalFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the admission transition for `key` locally.
    pub fn transition(&self, key: &str, config: &RateLimiterConfig, now_millis: i64) -> bool {
        let bucket_id = scope(config.algorithm, key);
        let bucket = self
            .buckets
            .entry(bucket_id)
            .or_insert_with(|| {
                debug!(key = %key, algorithm = %config.algorithm, "Creating fallback bucket");
                Arc::new(Mutex::new(BucketState::initial(config, now_millis)))
            })
            .clone();

        let mut state = bucket.lock();
        state.transition(config, now_millis)
    }

    /// Current state of the bucket for `key`, if a fallback decision ever
    /// evaluated it.
    pub fn snapshot(&self, key: &str, config: &RateLimiterConfig) -> Option<BucketState> {
        let bucket = self.buckets.get(&scope(config.algorithm, key))?.clone();
        let state = *bucket.lock();
        Some(state)
    }

    /// Number of buckets ever created.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
