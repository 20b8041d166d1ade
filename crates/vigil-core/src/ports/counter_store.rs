//! Counter store port - the only shared mutable state behind admission control.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BucketState, BucketStep, WindowSample};

/// Pure step applied inside a bucket read-modify-write.
pub type BucketUpdate<'a> = &'a (dyn Fn(Option<BucketState>) -> BucketStep + Send + Sync);

/// Key-value and time-series primitives used by the rate limiter and the
/// CSRF token store.
///
/// Every operation is atomic with respect to concurrent callers on the same
/// key. Implementations must not serialize unrelated keys behind one lock.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment an integer counter, setting `ttl` only when the key is created.
    async fn increment_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Expire entries at or before `now - window`, then record `now` only if
    /// fewer than `limit` entries remain. Trim, check and add are one step.
    async fn add_timestamp_trim(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowSample, StoreError>;

    async fn get_bucket_state(&self, key: &str) -> Result<Option<BucketState>, StoreError>;

    async fn save_bucket_state(
        &self,
        key: &str,
        state: BucketState,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Read the bucket, apply `update`, persist the resulting state.
    ///
    /// The default is two round trips (get, then save) and admits a bounded
    /// over-admission when two callers race on one key. Backends that can
    /// hold a per-key lock override it.
    async fn update_bucket(
        &self,
        key: &str,
        ttl: Duration,
        update: BucketUpdate<'_>,
    ) -> Result<BucketStep, StoreError> {
        let current = self.get_bucket_state(key).await?;
        let step = update(current);
        self.save_bucket_state(key, step.state, ttl).await?;
        Ok(step)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically read and remove a value. At most one concurrent caller
    /// observes `Some` for a given stored value.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove expired entries. Backends with native per-key TTL return 0.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Counter store errors. All of them mean the store could not answer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}
