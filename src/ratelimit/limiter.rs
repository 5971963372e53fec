//! Core rate limiter implementation.
//!
//! Decisions are made against the shared backend with a bounded, fixed-delay
//! retry. When every attempt fails the decision is made from local fallback
//! state instead. Shared and fallback state are independent timelines: neither
//! is copied into the other when the backend goes away or comes back.

use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

use super::backend::SharedStateBackend;
use super::bucket::tokens_left;
use super::descriptor::StateKeys;
use super::fallback::LocalFallbackStore;
use super::rules::{ConfigStore, RateLimiterConfig};
use super::status::RateLimiterStatus;
use crate::config::{RetryConfig, ServiceConfig};
use crate::error::Result;
use crate::metrics::{AtomicMetrics, MetricsSink};
use crate::store::{parse_level, BackendError, RedisBackend};

/// The admission engine.
///
/// This struct is thread-safe and can be shared across tasks behind an `Arc`.
pub struct RateLimiter<B: SharedStateBackend> {
    backend: Arc<B>,
    configs: ConfigStore,
    fallback: LocalFallbackStore,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryConfig,
}

impl<B: SharedStateBackend> RateLimiter<B> {
    /// Create a rate limiter with default settings.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            configs: ConfigStore::default(),
            fallback: LocalFallbackStore::new(),
            metrics: Arc::new(AtomicMetrics::new()),
            retry: RetryConfig::default(),
        }
    }

    /// Create a rate limiter from service configuration, installing the
    /// configured `global` and per-key limiters.
    pub fn from_config(
        backend: Arc<B>,
        config: &ServiceConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let configs = ConfigStore::new(config.global)?;
        for (key, limit) in &config.limits {
            configs.set(key, *limit)?;
        }

        Ok(Self {
            backend,
            configs,
            fallback: LocalFallbackStore::new(),
            metrics,
            retry: config.retry.clone(),
        })
    }

    /// The shared backend decisions are made against.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Set the limiter for `key`. Visible to the next decision.
    pub fn set_config(&self, key: &str, config: RateLimiterConfig) -> Result<()> {
        self.configs.set(key, config)
    }

    /// The limiter that currently applies to `key`.
    pub fn config(&self, key: &str) -> RateLimiterConfig {
        self.configs.lookup(key)
    }

    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    pub fn fallback(&self) -> &LocalFallbackStore {
        &self.fallback
    }

    /// Decide whether to admit a request for `key` now.
    pub async fn decide(&self, key: &str) -> bool {
        self.decide_at(key, now_millis()).await
    }

    /// Decide whether to admit a request for `key` at `now_millis`.
    ///
    /// Never fails: backend errors are retried, then absorbed by deciding
    /// from local fallback state.
    pub async fn decide_at(&self, key: &str, now_millis: i64) -> bool {
        let config = self.configs.lookup(key);
        let keys = StateKeys::new(config.algorithm, key);

        trace!(
            key = %key,
            algorithm = %config.algorithm,
            capacity = config.capacity,
            "Checking rate limit"
        );

        let shared = self
            .with_retry(key, "transition", || {
                self.backend.atomic_transition(&keys, &config, now_millis)
            })
            .await;

        let admitted = match shared {
            Ok(admitted) => admitted,
            Err(error) => {
                warn!(
                    key = %key,
                    error = %error,
                    "Shared backend unavailable, deciding from local fallback state"
                );
                self.fallback.transition(key, &config, now_millis)
            }
        };

        if admitted {
            self.metrics.increment_success();
        } else {
            debug!(key = %key, algorithm = %config.algorithm, "Rate limit exceeded");
            self.metrics.increment_failure();
        }
        admitted
    }

    /// Report the current state of `key`'s limiter without modifying it.
    pub async fn status(&self, key: &str) -> RateLimiterStatus {
        let config = self.configs.lookup(key);
        let keys = StateKeys::new(config.algorithm, key);

        let shared = self
            .with_retry(key, "status", || self.backend.get(&keys.level))
            .await
            .and_then(|raw| raw.as_deref().map(parse_level).transpose());

        match shared {
            Ok(Some(level)) => RateLimiterStatus::new(&config, tokens_left(&config, level)),
            Ok(None) => RateLimiterStatus::full(&config),
            Err(error) => {
                warn!(
                    key = %key,
                    error = %error,
                    "Shared backend unavailable, reporting local fallback state"
                );
                match self.fallback.snapshot(key, &config) {
                    Some(state) => RateLimiterStatus::new(&config, state.tokens_left(&config)),
                    None => RateLimiterStatus::full(&config),
                }
            }
        }
    }

    /// Status of every configured key, `global` included.
    pub async fn all_statuses(&self) -> HashMap<String, RateLimiterStatus> {
        let keys = self.configs.keys();
        let statuses = join_all(keys.iter().map(|key| self.status(key))).await;
        keys.into_iter().zip(statuses).collect()
    }

    /// Run `attempt` against the backend up to the configured number of times,
    /// each bounded by the attempt timeout, sleeping a fixed delay in between.
    ///
    /// Retries are not idempotent. An attempt that times out may still have
    /// committed its transition on the backend, so one request can consume
    /// more than one unit, and once more from fallback state if every attempt
    /// times out.
    async fn with_retry<T, F, Fut>(
        &self,
        key: &str,
        operation: &'static str,
        mut attempt: F,
    ) -> std::result::Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let timeout = self.retry.attempt_timeout();
        let mut n = 1;

        loop {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(timeout)),
            };
            self.metrics.record_latency(started.elapsed());

            match result {
                Ok(value) => return Ok(value),
                Err(error) if n >= attempts => return Err(error),
                Err(error) => {
                    warn!(
                        key = %key,
                        operation = operation,
                        attempt = n,
                        error = %error,
                        "Shared backend attempt failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay()).await;
                    n += 1;
                }
            }
        }
    }
}

impl RateLimiter<RedisBackend> {
    /// Create a rate limiter backed by the Redis pool described in `config`.
    pub fn connect(config: &ServiceConfig, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        let backend = RedisBackend::new(&config.redis)?;
        Self::from_config(Arc::new(backend), config, metrics)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
