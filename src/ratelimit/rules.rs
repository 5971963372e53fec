//! Rate limiter rules and the live configuration store.
//!
//! Every key resolves to exactly one [`RateLimiterConfig`]: its own entry if one
//! was set, otherwise the reserved `global` entry. Resolution happens on every
//! lookup, so changing `global` retargets every unconfigured key immediately.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{RatekeeperError, Result};

/// The reserved key holding the default configuration.
pub const GLOBAL_KEY: &str = "global";

/// Largest accepted capacity or rate. Script arithmetic runs in doubles, so
/// larger values would diverge between the shared and fallback paths.
pub const MAX_LIMIT_VALUE: u64 = u32::MAX as u64;

/// Admission algorithm for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[serde(alias = "TOKEN_BUCKET")]
    TokenBucket,
    #[serde(alias = "LEAKY_BUCKET")]
    LeakyBucket,
}

impl Algorithm {
    /// Scope name used when deriving backend state keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::LeakyBucket => "leaky_bucket",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = RatekeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "token_bucket" => Ok(Algorithm::TokenBucket),
            "leaky_bucket" => Ok(Algorithm::LeakyBucket),
            other => Err(RatekeeperError::Config(format!(
                "unknown algorithm '{}', expected token_bucket or leaky_bucket",
                other
            ))),
        }
    }
}

/// Configuration for a single rate limiter.
///
/// For the leaky bucket, `refill_rate` is the leak rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum tokens (token bucket) or maximum water level (leaky bucket)
    pub capacity: u64,
    /// Units refilled or leaked per second
    pub refill_rate: u64,
    /// Which admission algorithm applies
    pub algorithm: Algorithm,
}

impl RateLimiterConfig {
    pub fn new(capacity: u64, refill_rate: u64, algorithm: Algorithm) -> Self {
        Self {
            capacity,
            refill_rate,
            algorithm,
        }
    }

    /// Reject configurations whose capacity or rate is zero or above
    /// [`MAX_LIMIT_VALUE`].
    pub fn validate(&self, key: &str) -> Result<()> {
        for (field, value) in [("capacity", self.capacity), ("refill_rate", self.refill_rate)] {
            if value == 0 {
                return Err(RatekeeperError::InvalidConfig {
                    key: key.to_string(),
                    field,
                    value,
                });
            }
            if value > MAX_LIMIT_VALUE {
                return Err(RatekeeperError::ConfigTooLarge {
                    key: key.to_string(),
                    field,
                    value,
                    max: MAX_LIMIT_VALUE,
                });
            }
        }
        Ok(())
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate: 1,
            algorithm: Algorithm::TokenBucket,
        }
    }
}

/// Concurrent key -> config mapping with a mandatory `global` entry.
///
/// Per-key entries live in a sharded map so writers only contend with readers
/// of the same shard. The `global` entry is held apart so it can never be absent.
pub struct ConfigStore {
    global: RwLock<RateLimiterConfig>,
    entries: DashMap<String, RateLimiterConfig>,
}

impl ConfigStore {
    /// Create a store whose `global` entry is `global`.
    pub fn new(global: RateLimiterConfig) -> Result<Self> {
        global.validate(GLOBAL_KEY)?;
        Ok(Self {
            global: RwLock::new(global),
            entries: DashMap::new(),
        })
    }

    /// Set the config for `key`. Last write wins.
    pub fn set(&self, key: &str, config: RateLimiterConfig) -> Result<()> {
        config.validate(key)?;

        if key == GLOBAL_KEY {
            *self.global.write() = config;
        } else {
            self.entries.insert(key.to_string(), config);
        }

        debug!(
            key = %key,
            capacity = config.capacity,
            refill_rate = config.refill_rate,
            algorithm = %config.algorithm,
            "Rate limiter config updated"
        );
        Ok(())
    }

    /// Resolve the config for `key`, falling back to `global`.
    pub fn lookup(&self, key: &str) -> RateLimiterConfig {
        if key != GLOBAL_KEY {
            if let Some(config) = self.entries.get(key) {
                return *config;
            }
        }
        *self.global.read()
    }

    /// Whether `key` has an explicit entry. `global` always does.
    pub fn contains(&self, key: &str) -> bool {
        key == GLOBAL_KEY || self.entries.contains_key(key)
    }

    /// All configured keys, `global` included.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.entries.len() + 1);
        keys.push(GLOBAL_KEY.to_string());
        keys.extend(self.entries.iter().map(|e| e.key().clone()));
        keys
    }

    /// Number of configured keys, `global` included.
    pub fn len(&self) -> usize {
        self.entries.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            global: RwLock::new(RateLimiterConfig::default()),
            entries: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_global_config() {
        let store = ConfigStore::default();
        let config = store.lookup(GLOBAL_KEY);
        assert_eq!(config.capacity, 10);
        assert_eq!(config.refill_rate, 1);
        assert_eq!(config.algorithm, Algorithm::TokenBucket);
    }

    #[test]
    fn test_unconfigured_key_resolves_to_global() {
        let store = ConfigStore::default();
        assert_eq!(store.lookup("user-1"), store.lookup(GLOBAL_KEY));
        assert!(!store.contains("user-1"));
    }

    #[test]
    fn test_global_change_is_live_for_unconfigured_keys() {
        let store = ConfigStore::default();
        let before = store.lookup("api-key");

        let updated = RateLimiterConfig::new(3, 7, Algorithm::LeakyBucket);
        assert_ok!(store.set(GLOBAL_KEY, updated));

        assert_ne!(store.lookup("api-key"), before);
        assert_eq!(store.lookup("api-key"), updated);
    }

    #[test]
    fn test_explicit_config_overrides_global() {
        let store = ConfigStore::default();
        let config = RateLimiterConfig::new(2, 1, Algorithm::LeakyBucket);
        assert_ok!(store.set("premium", config));

        assert_eq!(store.lookup("premium"), config);
        assert_eq!(store.lookup("basic"), RateLimiterConfig::default());
    }

    #[test]
    fn test_last_write_wins() {
        let store = ConfigStore::default();
        assert_ok!(store.set("k", RateLimiterConfig::new(5, 1, Algorithm::TokenBucket)));
        assert_ok!(store.set("k", RateLimiterConfig::new(8, 2, Algorithm::TokenBucket)));
        assert_eq!(store.lookup("k").capacity, 8);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_rejects_zero_capacity_and_rate() {
        let store = ConfigStore::default();

        let err = assert_err!(store.set("k", RateLimiterConfig::new(0, 1, Algorithm::TokenBucket)));
        assert!(matches!(
            err,
            RatekeeperError::InvalidConfig { field: "capacity", .. }
        ));

        let err = assert_err!(store.set(GLOBAL_KEY, RateLimiterConfig::new(1, 0, Algorithm::LeakyBucket)));
        assert!(matches!(
            err,
            RatekeeperError::InvalidConfig { field: "refill_rate", .. }
        ));

        // Rejected writes leave existing entries untouched
        assert!(!store.contains("k"));
        assert_eq!(store.lookup(GLOBAL_KEY), RateLimiterConfig::default());
    }

    #[test]
    fn test_rejects_values_beyond_script_precision() {
        let store = ConfigStore::default();

        assert_ok!(store.set("max", RateLimiterConfig::new(MAX_LIMIT_VALUE, MAX_LIMIT_VALUE, Algorithm::TokenBucket)));

        let err = assert_err!(store.set("huge", RateLimiterConfig::new(1 << 53, 1, Algorithm::TokenBucket)));
        assert!(matches!(
            err,
            RatekeeperError::ConfigTooLarge { field: "capacity", max: MAX_LIMIT_VALUE, .. }
        ));

        let err = assert_err!(store.set("huge", RateLimiterConfig::new(1, MAX_LIMIT_VALUE + 1, Algorithm::LeakyBucket)));
        assert!(matches!(
            err,
            RatekeeperError::ConfigTooLarge { field: "refill_rate", .. }
        ));
        assert!(!store.contains("huge"));
    }

    #[test]
    fn test_keys_always_include_global() {
        let store = ConfigStore::default();
        assert_eq!(store.keys(), vec![GLOBAL_KEY.to_string()]);

        assert_ok!(store.set("a", RateLimiterConfig::default()));
        assert_ok!(store.set("b", RateLimiterConfig::default()));
        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", GLOBAL_KEY]);
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("token_bucket".parse::<Algorithm>().unwrap(), Algorithm::TokenBucket);
        assert_eq!("LEAKY_BUCKET".parse::<Algorithm>().unwrap(), Algorithm::LeakyBucket);
        assert!("sliding_window".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_parse_config_yaml() {
        let yaml = r#"
capacity: 20
refill_rate: 4
algorithm: LEAKY_BUCKET
"#;
        let config: RateLimiterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config, RateLimiterConfig::new(20, 4, Algorithm::LeakyBucket));
    }
}
