//! State key naming for bucket state in the shared backend.

use super::rules::Algorithm;

/// The pair of backend keys holding one bucket's state.
///
/// Keys are scoped by algorithm so token-bucket and leaky-bucket state for the
/// same caller key never alias. Layout: `rl:<algorithm>:<key>:<field>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKeys {
    /// Tokens remaining or water level
    pub level: String,
    /// Timestamp of the last refill or leak, in epoch milliseconds
    pub last_update: String,
}

impl StateKeys {
    pub fn new(algorithm: Algorithm, key: &str) -> Self {
        let scope = scope(algorithm, key);
        let (level_field, time_field) = match algorithm {
            Algorithm::TokenBucket => ("tokens", "lastRefill"),
            Algorithm::LeakyBucket => ("water", "lastLeak"),
        };

        Self {
            level: format!("{}:{}", scope, level_field),
            last_update: format!("{}:{}", scope, time_field),
        }
    }
}

/// `rl:<algorithm>:<key>`, the identity of one bucket.
pub fn scope(algorithm: Algorithm, key: &str) -> String {
    format!("rl:{}:{}", algorithm.as_str(), key)
}

impl std::fmt::Display for StateKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.level, self.last_update)
    }
}
