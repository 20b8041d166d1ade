//! Rate limit policies and subscription tiers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Admission-control algorithm applied by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Clock-aligned, non-overlapping windows. Up to `2 × requests` may pass
    /// across a window boundary.
    FixedWindow,
    /// Trailing interval of `window` seconds, not clock-aligned.
    SlidingWindow,
    /// Continuous refill at `requests / window` tokens per second, capped at
    /// `burst_size`.
    TokenBucket,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FixedWindow => "fixed_window",
            Strategy::SlidingWindow => "sliding_window",
            Strategy::TokenBucket => "token_bucket",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed_window" | "fixed" => Ok(Strategy::FixedWindow),
            "sliding_window" | "sliding" => Ok(Strategy::SlidingWindow),
            "token_bucket" | "bucket" => Ok(Strategy::TokenBucket),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Raw, unvalidated policy as it appears in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySpec {
    pub requests: u32,
    pub window_seconds: u64,
    pub strategy: Strategy,
    #[serde(default)]
    pub burst_size: Option<u32>,
}

/// Validated, immutable rate limit policy.
///
/// Construction is the only place a policy can fail; every value of this
/// type has a non-zero window and, when `requests > 0`, a burst of at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicySpec", into = "PolicySpec")]
pub struct RateLimitPolicy {
    requests: u32,
    window_seconds: u64,
    strategy: Strategy,
    burst_size: u32,
}

impl RateLimitPolicy {
    /// Create a policy with the default burst of `2 × requests`.
    pub fn new(requests: u32, window_seconds: u64, strategy: Strategy) -> Result<Self, ConfigError> {
        Self::with_burst(requests, window_seconds, strategy, requests.saturating_mul(2))
    }

    /// Create a policy with an explicit token-bucket burst size.
    pub fn with_burst(
        requests: u32,
        window_seconds: u64,
        strategy: Strategy,
        burst_size: u32,
    ) -> Result<Self, ConfigError> {
        if window_seconds == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if requests > 0 && burst_size == 0 {
            return Err(ConfigError::ZeroBurst);
        }

        Ok(Self {
            requests,
            window_seconds,
            strategy,
            burst_size,
        })
    }

    pub fn requests(&self) -> u32 {
        self.requests
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn burst_size(&self) -> u32 {
        self.burst_size
    }

    /// Token refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.requests) / self.window_seconds as f64
    }
}

impl TryFrom<PolicySpec> for RateLimitPolicy {
    type Error = ConfigError;

    fn try_from(raw: PolicySpec) -> Result<Self, Self::Error> {
        match raw.burst_size {
            Some(burst) => Self::with_burst(raw.requests, raw.window_seconds, raw.strategy, burst),
            None => Self::new(raw.requests, raw.window_seconds, raw.strategy),
        }
    }
}

impl From<RateLimitPolicy> for PolicySpec {
    fn from(policy: RateLimitPolicy) -> Self {
        Self {
            requests: policy.requests,
            window_seconds: policy.window_seconds,
            strategy: policy.strategy,
            burst_size: Some(policy.burst_size),
        }
    }
}

/// Subscription tier that selects a rate limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Starter, Tier::Professional, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Professional => "professional",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Requests per hour granted to the tier by default.
    pub fn default_requests(&self) -> u32 {
        match self {
            Tier::Free => 100,
            Tier::Starter => 1_000,
            Tier::Professional => 10_000,
            Tier::Enterprise => 100_000,
        }
    }

    pub fn default_window_seconds(&self) -> u64 {
        3600
    }

    /// Default policy for this tier under the given strategy.
    pub fn default_policy(&self, strategy: Strategy) -> RateLimitPolicy {
        RateLimitPolicy {
            requests: self.default_requests(),
            window_seconds: self.default_window_seconds(),
            strategy,
            burst_size: self.default_requests() * 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "professional" | "pro" => Ok(Tier::Professional),
            "enterprise" => Ok(Tier::Enterprise),
            _ => Err(ConfigError::UnknownTier(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_burst_is_twice_requests() {
        let policy = RateLimitPolicy::new(10, 60, Strategy::TokenBucket).unwrap();
        assert_eq!(policy.burst_size(), 20);
        assert!((policy.refill_rate() - 10.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_window_rejected_at_construction() {
        let err = RateLimitPolicy::new(10, 0, Strategy::FixedWindow).unwrap_err();
        assert_eq!(err, ConfigError::ZeroWindow);
    }

    #[test]
    fn test_zero_burst_rejected_when_requests_positive() {
        let err = RateLimitPolicy::with_burst(10, 60, Strategy::TokenBucket, 0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroBurst);

        // A closed policy needs no burst.
        assert!(RateLimitPolicy::with_burst(0, 60, Strategy::TokenBucket, 0).is_ok());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("fixed_window".parse::<Strategy>().unwrap(), Strategy::FixedWindow);
        assert_eq!("Sliding-Window".parse::<Strategy>().unwrap(), Strategy::SlidingWindow);
        assert_eq!("token_bucket".parse::<Strategy>().unwrap(), Strategy::TokenBucket);
        assert!(matches!(
            "leaky_bucket".parse::<Strategy>(),
            Err(ConfigError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_tier_defaults() {
        let policy = Tier::Professional.default_policy(Strategy::SlidingWindow);
        assert_eq!(policy.requests(), 10_000);
        assert_eq!(policy.window_seconds(), 3600);
        assert_eq!("pro".parse::<Tier>().unwrap(), Tier::Professional);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: RateLimitPolicy = serde_json::from_str(
            r#"{"requests": 5, "window_seconds": 10, "strategy": "token_bucket"}"#,
        )
        .unwrap();
        assert_eq!(ok.burst_size(), 10);

        let bad = serde_json::from_str::<RateLimitPolicy>(
            r#"{"requests": 5, "window_seconds": 0, "strategy": "fixed_window"}"#,
        );
        assert!(bad.is_err());
    }
}
