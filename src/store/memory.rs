//! In-process shared state.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{parse_level, BackendError};
use crate::ratelimit::{BucketState, RateLimiterConfig, SharedStateBackend, StateKeys};

/// A backend that keeps string-valued state in process memory.
///
/// Values are laid out exactly as in Redis. Each bucket has its own lock,
/// held for the whole read-compute-write of a transition; plain reads do not
/// take it.
#[derive(Default)]
pub struct MemoryBackend {
    values: DashMap<String, String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw value, as an operator could with `SET`.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn load(&self, keys: &StateKeys, config: &RateLimiterConfig, now_millis: i64) -> Result<BucketState, BackendError> {
        let mut state = BucketState::initial(config, now_millis);

        if let Some(level) = self.values.get(&keys.level) {
            state.level = parse_level(level.value())?;
        }
        if let Some(last) = self.values.get(&keys.last_update) {
            state.last_update_millis = last.value().parse().map_err(|_| {
                BackendError::UnexpectedReply(format!("invalid timestamp '{}'", last.value()))
            })?;
        }
        Ok(state)
    }
}

#[async_trait]
impl SharedStateBackend for MemoryBackend {
    async fn atomic_transition(
        &self,
        keys: &StateKeys,
        config: &RateLimiterConfig,
        now_millis: i64,
    ) -> Result<bool, BackendError> {
        let lock = self
            .locks
            .entry(keys.level.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        let mut state = self.load(keys, config, now_millis)?;
        let admitted = state.transition(config, now_millis);

        self.values.insert(keys.level.clone(), state.level.to_string());
        self.values
            .insert(keys.last_update.clone(), state.last_update_millis.to_string());

        Ok(admitted)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }
}
