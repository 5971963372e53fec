//! Shared state backends.
//!
//! `RedisBackend` is the networked store shared by every service instance.
//! It runs each admission transition as a server-side Lua script, which Redis
//! executes without interleaving. `MemoryBackend` satisfies the same contract
//! inside one process.

mod memory;
mod redis_store;

use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryBackend;
pub use self::redis_store::RedisBackend;

/// Errors raised by a shared state backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Failed to acquire pooled connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    #[error("Failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),
    #[error("Backend attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unexpected backend reply: {0}")]
    UnexpectedReply(String),
}

/// Parse a stored level value.
///
/// Script arithmetic may round-trip through floating point, so `"3"` and
/// `"3.0"` are both accepted. Negative values clamp to zero.
pub(crate) fn parse_level(raw: &str) -> Result<u64, BackendError> {
    if let Ok(level) = raw.parse::<i64>() {
        return Ok(level.max(0) as u64);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|level| level.is_finite())
        .map(|level| level.max(0.0) as u64)
        .ok_or_else(|| BackendError::UnexpectedReply(format!("invalid bucket level '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("7").unwrap(), 7);
        assert_eq!(parse_level("7.0").unwrap(), 7);
        assert_eq!(parse_level("-2").unwrap(), 0);
        assert!(matches!(
            parse_level("seven"),
            Err(BackendError::UnexpectedReply(_))
        ));
        assert!(parse_level("NaN").is_err());
    }
}
