//! Store-backed rate limiter: fixed window, sliding window and token bucket.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use vigil_core::domain::bucket::{seconds_to_full, take_token};
use vigil_core::domain::decision::seconds;
use vigil_core::domain::{FixedWindow, RateLimitDecision, RateLimitPolicy, Strategy};
use vigil_core::ports::{Clock, CounterStore, RateLimitError, RateLimiter, StoreError, SystemClock};

use crate::store::with_deadline;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Key prefix for rate limit keys.
    pub key_prefix: String,
    /// Deadline for a single store call.
    pub store_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ratelimit".to_string(),
            store_timeout: Duration::from_millis(250),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
            store_timeout: Duration::from_millis(
                std::env::var("STORE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
        }
    }
}

/// Rate limiter running every strategy against an injected `CounterStore`.
///
/// The arithmetic lives here once; backends only provide atomic primitives.
pub struct StoreRateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl StoreRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn make_key(&self, identifier: &str, strategy: Strategy) -> String {
        format!("{}:{}:{}", self.config.key_prefix, strategy, identifier)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        with_deadline(self.config.store_timeout, call).await
    }

    async fn fixed_window(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: f64,
    ) -> Result<RateLimitDecision, StoreError> {
        let window = FixedWindow::containing(now, policy.window_seconds());
        let key = format!(
            "{}:{}",
            self.make_key(identifier, Strategy::FixedWindow),
            window.index
        );

        let count = self
            .bounded(self.store.increment_window(&key, policy.window()))
            .await?;

        let limit = policy.requests();
        let reset_at = window.resets_at();
        if count <= u64::from(limit) {
            Ok(RateLimitDecision::allow(
                limit,
                (u64::from(limit) - count) as u32,
                reset_at,
            ))
        } else {
            Ok(RateLimitDecision::deny(limit, reset_at, reset_at - now))
        }
    }

    async fn sliding_window(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: f64,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = self.make_key(identifier, Strategy::SlidingWindow);
        let limit = policy.requests();

        let sample = self
            .bounded(self.store.add_timestamp_trim(
                &key,
                now,
                policy.window(),
                u64::from(limit),
            ))
            .await?;

        let window = policy.window_seconds() as f64;
        let reset_at = sample.oldest.map(|t| t + window).unwrap_or(now + window);
        if sample.admitted {
            let remaining = u64::from(limit).saturating_sub(sample.count) as u32;
            Ok(RateLimitDecision::allow(limit, remaining, reset_at))
        } else {
            Ok(RateLimitDecision::deny(limit, reset_at, reset_at - now))
        }
    }

    async fn token_bucket(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: f64,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = self.make_key(identifier, Strategy::TokenBucket);
        let rate = policy.refill_rate();
        let burst = f64::from(policy.burst_size());
        let requests = f64::from(policy.requests());
        // Idle buckets expire once they would have refilled completely.
        let ttl = seconds(seconds_to_full(0.0, rate, burst)).max(policy.window());

        let step = self
            .bounded(
                self.store.update_bucket(&key, ttl, &|previous| {
                    take_token(previous, now, rate, burst, requests)
                }),
            )
            .await?;

        let limit = policy.burst_size();
        if step.allowed {
            Ok(RateLimitDecision::allow(
                limit,
                step.tokens.floor() as u32,
                now + seconds_to_full(step.tokens, rate, burst),
            ))
        } else {
            Ok(RateLimitDecision::deny(
                limit,
                now + step.retry_after,
                step.retry_after,
            ))
        }
    }
}

#[async_trait]
impl RateLimiter for StoreRateLimiter {
    async fn check_and_consume(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let now = self.clock.now();

        if policy.requests() == 0 {
            let window = policy.window_seconds() as f64;
            return Ok(RateLimitDecision::deny(0, now + window, window));
        }

        let result = match policy.strategy() {
            Strategy::FixedWindow => self.fixed_window(identifier, policy, now).await,
            Strategy::SlidingWindow => self.sliding_window(identifier, policy, now).await,
            Strategy::TokenBucket => self.token_bucket(identifier, policy, now).await,
        };

        match result {
            Ok(decision) => {
                tracing::debug!(
                    identifier = %identifier,
                    strategy = %policy.strategy(),
                    allowed = decision.allowed,
                    remaining = decision.remaining,
                    "Rate limit decision"
                );
                Ok(decision)
            }
            Err(e) => {
                tracing::error!(
                    identifier = %identifier,
                    strategy = %policy.strategy(),
                    error = %e,
                    "Rate limit store call failed"
                );
                Err(RateLimitError::StoreUnavailable(e))
            }
        }
    }
}
