//! Token bucket arithmetic.
//!
//! One implementation shared by every store backend. The store only decides
//! how the read-modify-write around [`take_token`] is made atomic.

use serde::{Deserialize, Serialize};

/// Persisted per-identifier bucket state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: f64,
    /// Unix seconds of the last refill that was committed.
    pub last_refill: f64,
}

/// Result of one refill-and-take step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStep {
    /// State to persist. Equal to the previous state on rejection.
    pub state: BucketState,
    pub allowed: bool,
    /// Tokens available after this step (refilled, minus the one taken).
    pub tokens: f64,
    /// Seconds until one token is available. Zero when allowed.
    pub retry_after: f64,
}

/// Refill the bucket up to `now`, then try to take one token.
///
/// An absent bucket is seeded with `min(requests, burst)` tokens, so a new
/// identifier gets exactly `requests` calls before refill matters. Idle
/// accrual still fills up to `burst`.
///
/// Clock skew (`now < last_refill`) refills nothing and never moves
/// `last_refill` backwards. A rejection leaves the stored state untouched so
/// the next call accounts for the full elapsed interval.
pub fn take_token(
    previous: Option<BucketState>,
    now: f64,
    rate: f64,
    burst: f64,
    requests: f64,
) -> BucketStep {
    let previous = previous.unwrap_or(BucketState {
        tokens: requests.min(burst),
        last_refill: now,
    });

    let elapsed = (now - previous.last_refill).max(0.0);
    let tokens = (previous.tokens + elapsed * rate).clamp(0.0, burst);

    if tokens >= 1.0 {
        let tokens = tokens - 1.0;
        BucketStep {
            state: BucketState {
                tokens,
                last_refill: now.max(previous.last_refill),
            },
            allowed: true,
            tokens,
            retry_after: 0.0,
        }
    } else {
        let retry_after = if rate > 0.0 {
            ((1.0 - tokens) / rate).ceil()
        } else {
            f64::INFINITY
        };
        BucketStep {
            state: previous,
            allowed: false,
            tokens,
            retry_after,
        }
    }
}

/// Seconds until a bucket holding `tokens` is full again.
pub fn seconds_to_full(tokens: f64, rate: f64, burst: f64) -> f64 {
    if rate > 0.0 {
        ((burst - tokens).max(0.0)) / rate
    } else {
        0.0
    }
}
