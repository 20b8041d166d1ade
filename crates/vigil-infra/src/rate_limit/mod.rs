//! Rate limiting over a pluggable counter store.

mod limiter;

pub use limiter::{RateLimitConfig, StoreRateLimiter};
