//! Bucket state and the admission transitions.
//!
//! The same transition runs inside the shared backend (as a server-side script
//! or under a backend lock) and in the local fallback store. Time is accounted
//! in whole seconds: sub-second elapsed time neither refills nor leaks.

use super::rules::{Algorithm, RateLimiterConfig};

/// Mutable state of one bucket.
///
/// `level` is tokens remaining for a token bucket and accumulated water for a
/// leaky bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    pub level: u64,
    pub last_update_millis: i64,
}

impl BucketState {
    /// State of a bucket that has never been evaluated.
    pub fn initial(config: &RateLimiterConfig, now_millis: i64) -> Self {
        let level = match config.algorithm {
            Algorithm::TokenBucket => config.capacity,
            Algorithm::LeakyBucket => 0,
        };
        Self {
            level,
            last_update_millis: now_millis,
        }
    }

    /// Apply one admission attempt at `now_millis`.
    ///
    /// Returns `true` if the request is admitted. The timestamp is advanced
    /// whether or not the request is admitted.
    pub fn transition(&mut self, config: &RateLimiterConfig, now_millis: i64) -> bool {
        let elapsed = elapsed_seconds(self.last_update_millis, now_millis);
        let delta = elapsed.saturating_mul(config.refill_rate);
        self.last_update_millis = now_millis;

        match config.algorithm {
            Algorithm::TokenBucket => {
                self.level = self.level.saturating_add(delta).min(config.capacity);
                if self.level > 0 {
                    self.level -= 1;
                    true
                } else {
                    false
                }
            }
            Algorithm::LeakyBucket => {
                self.level = self.level.saturating_sub(delta).min(config.capacity);
                if self.level < config.capacity {
                    self.level += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Remaining admission headroom as reported to callers.
    pub fn tokens_left(&self, config: &RateLimiterConfig) -> u64 {
        tokens_left(config, self.level)
    }
}

/// Headroom for a raw stored level: tokens for a token bucket,
/// `capacity - water` for a leaky bucket.
pub fn tokens_left(config: &RateLimiterConfig, level: u64) -> u64 {
    match config.algorithm {
        Algorithm::TokenBucket => level.min(config.capacity),
        Algorithm::LeakyBucket => config.capacity.saturating_sub(level),
    }
}

/// Whole seconds between two millisecond timestamps, never negative.
fn elapsed_seconds(last_millis: i64, now_millis: i64) -> u64 {
    let elapsed_millis = now_millis.saturating_sub(last_millis).max(0);
    (elapsed_millis / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(capacity: u64, rate: u64) -> RateLimiterConfig {
        RateLimiterConfig::new(capacity, rate, Algorithm::TokenBucket)
    }

    fn leaky(capacity: u64, rate: u64) -> RateLimiterConfig {
        RateLimiterConfig::new(capacity, rate, Algorithm::LeakyBucket)
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(BucketState::initial(&token(5, 1), 42).level, 5);
        assert_eq!(BucketState::initial(&leaky(5, 1), 42).level, 0);
        assert_eq!(BucketState::initial(&leaky(5, 1), 42).last_update_millis, 42);
    }

    #[test]
    fn test_token_bucket_exhausts_capacity() {
        let config = token(2, 1);
        let mut state = BucketState::initial(&config, 1_000);

        assert!(state.transition(&config, 1_000));
        assert!(state.transition(&config, 1_000));
        assert!(!state.transition(&config, 1_000));
        assert_eq!(state.level, 0);
    }

    #[test]
    fn test_token_bucket_refills_one_token_per_second() {
        let config = token(1, 1);
        let mut state = BucketState::initial(&config, 0);

        assert!(state.transition(&config, 0));
        assert!(!state.transition(&config, 0));
        assert!(state.transition(&config, 1_000));
    }

    #[test]
    fn test_sub_second_elapsed_does_not_refill() {
        let config = token(1, 10);
        let mut state = BucketState::initial(&config, 0);

        assert!(state.transition(&config, 0));
        assert!(!state.transition(&config, 999));
        // The rejection above moved the timestamp to 999
        assert!(!state.transition(&config, 1_500));
        assert!(state.transition(&config, 2_500));
    }

    #[test]
    fn test_token_bucket_refill_is_capped() {
        let config = token(3, 5);
        let mut state = BucketState::initial(&config, 0);

        assert!(state.transition(&config, 0));
        assert!(state.transition(&config, 60_000));
        assert_eq!(state.level, 2);
    }

    #[test]
    fn test_rejection_advances_timestamp() {
        let config = token(1, 1);
        let mut state = BucketState::initial(&config, 0);

        assert!(state.transition(&config, 0));
        assert!(!state.transition(&config, 500));
        assert_eq!(state.last_update_millis, 500);
    }

    #[test]
    fn test_leaky_bucket_fills_to_capacity() {
        let config = leaky(1, 1);
        let mut state = BucketState::initial(&config, 0);

        assert!(state.transition(&config, 0));
        assert!(!state.transition(&config, 0));
        assert_eq!(state.level, 1);
    }

    #[test]
    fn test_leaky_bucket_leaks_over_time() {
        let config = leaky(2, 1);
        let mut state = BucketState::initial(&config, 0);

        assert!(state.transition(&config, 0));
        assert!(state.transition(&config, 0));
        assert!(!state.transition(&config, 0));
        assert!(state.transition(&config, 1_000));
        assert_eq!(state.level, 2);
    }

    #[test]
    fn test_clock_going_backwards_is_zero_elapsed() {
        let config = token(1, 1);
        let mut state = BucketState::initial(&config, 10_000);

        assert!(state.transition(&config, 10_000));
        assert!(!state.transition(&config, 5_000));
        assert_eq!(state.level, 0);
    }

    #[test]
    fn test_level_clamped_after_capacity_shrinks() {
        let mut state = BucketState {
            level: 10,
            last_update_millis: 0,
        };

        assert!(state.transition(&token(4, 1), 0));
        assert_eq!(state.level, 3);

        let mut water = BucketState {
            level: 10,
            last_update_millis: 0,
        };
        assert!(!water.transition(&leaky(4, 1), 0));
        assert_eq!(water.level, 4);
    }

    #[test]
    fn test_tokens_left() {
        assert_eq!(tokens_left(&token(5, 1), 3), 3);
        assert_eq!(tokens_left(&leaky(5, 1), 3), 2);
        assert_eq!(tokens_left(&leaky(5, 1), 9), 0);
    }
}
