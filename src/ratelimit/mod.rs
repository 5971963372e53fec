//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod descriptor;
mod fallback;
mod limiter;
mod rules;
mod status;

pub use backend::SharedStateBackend;
pub use bucket::{tokens_left, BucketState};
pub use descriptor::StateKeys;
pub use fallback::LocalFallbackStore;
pub use limiter::RateLimiter;
pub use rules::{Algorithm, ConfigStore, RateLimiterConfig, GLOBAL_KEY, MAX_LIMIT_VALUE};
pub use status::RateLimiterStatus;
