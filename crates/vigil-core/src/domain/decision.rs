//! Rate limit decisions and their HTTP header rendering.

use std::time::Duration;

use serde::Serialize;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Outcome of a single `check_and_consume` call. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Units left in the current window or bucket. Always 0 when denied.
    pub remaining: u32,
    /// Ceiling that `remaining` is measured against.
    pub limit: u32,
    /// Unix time (seconds) at which the limit resets.
    pub reset_at: f64,
    /// Zero when allowed.
    pub retry_after: Duration,
}

impl RateLimitDecision {
    pub fn allow(limit: u32, remaining: u32, reset_at: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset_at,
            retry_after: Duration::ZERO,
        }
    }

    pub fn deny(limit: u32, reset_at: f64, retry_after_secs: f64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_at,
            retry_after: seconds(retry_after_secs),
        }
    }

    /// `Retry-After` value in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    /// `X-RateLimit-Reset` value as whole unix seconds, rounded up.
    pub fn reset_at_unix(&self) -> i64 {
        self.reset_at.ceil() as i64
    }

    /// Headers for HTTP-layer consumption. `Retry-After` only on denial.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset_at_unix().to_string()),
        ];
        if !self.allowed {
            headers.push((HEADER_RETRY_AFTER, self.retry_after_secs().to_string()));
        }
        headers
    }
}

/// Non-negative, finite seconds as a `Duration`.
pub fn seconds(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_decision_headers() {
        let decision = RateLimitDecision::deny(100, 3600.0, 57.2);

        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_secs(), 58);

        let headers = decision.headers();
        assert!(headers.contains(&(HEADER_REMAINING, "0".to_string())));
        assert!(headers.contains(&(HEADER_RESET, "3600".to_string())));
        assert!(headers.contains(&(HEADER_RETRY_AFTER, "58".to_string())));
    }

    #[test]
    fn test_allowed_decision_has_no_retry_after() {
        let decision = RateLimitDecision::allow(10, 7, 120.5);
        let headers = decision.headers();

        assert_eq!(decision.retry_after, Duration::ZERO);
        assert!(headers.iter().all(|(name, _)| *name != HEADER_RETRY_AFTER));
        assert!(headers.contains(&(HEADER_RESET, "121".to_string())));
    }

    #[test]
    fn test_seconds_clamps_invalid_input() {
        assert_eq!(seconds(-3.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
    }
}
