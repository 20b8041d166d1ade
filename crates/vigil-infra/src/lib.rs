//! # Vigil Infrastructure
//!
//! Concrete implementations of the ports defined in `vigil-core`:
//! counter stores, the rate limiter, request signing, CSRF tokens and the
//! security gateway that composes them.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external services, in-memory store only
//! - `signing` - HMAC-SHA256 request signing
//! - `redis` - Redis-backed counter store

pub mod csrf;
pub mod gateway;
pub mod rate_limit;
pub mod store;

#[cfg(feature = "signing")]
pub mod signing;

// Re-exports - In-Memory
pub use csrf::{CsrfConfig, StoreCsrfTokens, spawn_sweeper};
pub use gateway::{
    DenialReason, FailMode, GatewayConfig, GatewayVerdict, IpFilter, RequestContext,
    SecurityGateway, TierPolicies,
};
pub use rate_limit::{RateLimitConfig, StoreRateLimiter};
pub use store::InMemoryCounterStore;

#[cfg(feature = "signing")]
pub use signing::HmacRequestSigner;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisCounterStore};
