//! Configuration management for Ratekeeper.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{RatekeeperError, Result};
use crate::ratelimit::RateLimiterConfig;

/// Environment variable prefix for configuration overrides,
/// e.g. `RATEKEEPER__REDIS__URL`.
pub const ENV_PREFIX: &str = "RATEKEEPER";

/// Main configuration for the Ratekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Shared state backend connection
    #[serde(default)]
    pub redis: RedisConfig,

    /// Retry policy around the shared backend
    #[serde(default)]
    pub retry: RetryConfig,

    /// The `global` limiter applied to every unconfigured key
    #[serde(default)]
    pub global: RateLimiterConfig,

    /// Per-key limiters installed at start-up
    #[serde(default)]
    pub limits: HashMap<String, RateLimiterConfig>,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the request and admin endpoints listen on
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    16
}

/// Fixed-delay retry policy for shared backend calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before falling back to local state
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Upper bound on a single attempt in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    100
}

fn default_attempt_timeout_ms() -> u64 {
    250
}

impl ServiceConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ServiceConfig =
            serde_yaml::from_str(yaml).map_err(|e| RatekeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file with environment
    /// overrides layered on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        let config: ServiceConfig = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RatekeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every limiter and the retry policy.
    pub fn validate(&self) -> Result<()> {
        if self.retry.attempts == 0 {
            return Err(RatekeeperError::Config(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.redis.pool_size == 0 {
            return Err(RatekeeperError::Config(
                "redis.pool_size must be at least 1".to_string(),
            ));
        }
        self.global.validate(crate::ratelimit::GLOBAL_KEY)?;
        for (key, limit) in &self.limits {
            limit.validate(key)?;
        }
        Ok(())
    }
}
