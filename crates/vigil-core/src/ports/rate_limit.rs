//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::{RateLimitDecision, RateLimitPolicy};
use crate::ports::StoreError;

/// Rate limiter trait - abstraction over admission-control implementations.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide whether `identifier` may proceed under `policy`.
    /// An allowed decision has already consumed one unit.
    async fn check_and_consume(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, RateLimitError>;
}

/// Rate limit errors. A denial is a decision, not an error.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}
