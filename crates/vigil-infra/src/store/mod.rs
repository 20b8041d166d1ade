//! Counter store implementations - Redis and in-memory fallback.

use std::future::Future;
use std::time::Duration;

use vigil_core::ports::StoreError;

mod memory;

pub use memory::InMemoryCounterStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisCounterStore};

/// Bound a store call by `deadline`. Dropping the call on timeout is safe:
/// every store operation commits whole or not at all.
pub async fn with_deadline<T>(
    deadline: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| StoreError::Timeout(deadline))?
}
