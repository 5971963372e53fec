//! Redis-backed shared state.

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use redis::Script;
use tracing::{debug, info, trace};

use super::BackendError;
use crate::config::RedisConfig;
use crate::ratelimit::{Algorithm, RateLimiterConfig, SharedStateBackend, StateKeys};

/// KEYS: level, last refill. ARGV: capacity, refill rate, now (ms).
const TOKEN_BUCKET_LUA: &str = r#"
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local tokens = tonumber(redis.call('GET', KEYS[1]) or capacity)
local last_refill = tonumber(redis.call('GET', KEYS[2]) or now)
local elapsed = math.max(0, math.floor((now - last_refill) / 1000))
tokens = math.max(0, math.min(capacity, tokens + elapsed * refill_rate))
local admitted = 0
if tokens > 0 then
  tokens = tokens - 1
  admitted = 1
end
redis.call('SET', KEYS[1], tokens)
redis.call('SET', KEYS[2], now)
return admitted
"#;

/// KEYS: water, last leak. ARGV: capacity, leak rate, now (ms).
const LEAKY_BUCKET_LUA: &str = r#"
local capacity = tonumber(ARGV[1])
local leak_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local water = tonumber(redis.call('GET', KEYS[1]) or 0)
local last_leak = tonumber(redis.call('GET', KEYS[2]) or now)
local elapsed = math.max(0, math.floor((now - last_leak) / 1000))
water = math.min(capacity, math.max(0, water - elapsed * leak_rate))
local admitted = 0
if water < capacity then
  water = water + 1
  admitted = 1
end
redis.call('SET', KEYS[1], water)
redis.call('SET', KEYS[2], now)
return admitted
"#;

/// Shared state in Redis, reached through a connection pool.
///
/// A connection is checked out for exactly one command or script call and
/// returned to the pool when it drops.
pub struct RedisBackend {
    pool: Pool,
    token_bucket: Script,
    leaky_bucket: Script,
}

impl RedisBackend {
    /// Create a backend from configuration. No connection is opened until the
    /// first call.
    pub fn new(config: &RedisConfig) -> Result<Self, BackendError> {
        let mut pool_config = deadpool_redis::Config::from_url(config.url.as_str());
        pool_config.pool = Some(PoolConfig::new(config.pool_size));
        let pool = pool_config.create_pool(Some(Runtime::Tokio1))?;

        info!(
            url = %config.url,
            pool_size = config.pool_size,
            "Redis backend configured"
        );

        Ok(Self {
            pool,
            token_bucket: Script::new(TOKEN_BUCKET_LUA),
            leaky_bucket: Script::new(LEAKY_BUCKET_LUA),
        })
    }

    /// Check that Redis answers.
    pub async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.pool.get().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(reply = %reply, "Redis ping");
        Ok(())
    }

    fn script(&self, algorithm: Algorithm) -> &Script {
        match algorithm {
            Algorithm::TokenBucket => &self.token_bucket,
            Algorithm::LeakyBucket => &self.leaky_bucket,
        }
    }
}

#[async_trait]
impl SharedStateBackend for RedisBackend {
    async fn atomic_transition(
        &self,
        keys: &StateKeys,
        config: &RateLimiterConfig,
        now_millis: i64,
    ) -> Result<bool, BackendError> {
        let mut conn = self.pool.get().await?;

        trace!(keys = %keys, algorithm = %config.algorithm, "Invoking transition script");

        let reply: i64 = self
            .script(config.algorithm)
            .key(&keys.level)
            .key(&keys.last_update)
            .arg(config.capacity)
            .arg(config.refill_rate)
            .arg(now_millis)
            .invoke_async(&mut conn)
            .await?;

        match reply {
            1 => Ok(true),
            0 => Ok(false),
            other => Err(BackendError::UnexpectedReply(format!(
                "transition script returned {}",
                other
            ))),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_persist_state_unconditionally() {
        for script in [TOKEN_BUCKET_LUA, LEAKY_BUCKET_LUA] {
            assert_eq!(script.matches("redis.call('SET', KEYS[1]").count(), 1);
            assert_eq!(script.matches("redis.call('SET', KEYS[2], now)").count(), 1);
            assert!(script.trim_end().ends_with("return admitted"));
        }
    }

    #[test]
    fn test_scripts_are_distinct() {
        assert_ne!(
            Script::new(TOKEN_BUCKET_LUA).get_hash(),
            Script::new(LEAKY_BUCKET_LUA).get_hash()
        );
    }

    #[tokio::test]
    async fn test_backend_creation_is_lazy() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            pool_size: 2,
        };
        let backend = RedisBackend::new(&config).unwrap();
        assert_eq!(backend.pool.status().size, 0);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            pool_size: 2,
        };
        assert!(matches!(
            RedisBackend::new(&config),
            Err(BackendError::CreatePool(_))
        ));
    }
}
