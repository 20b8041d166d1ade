//! Gateway configuration: tier policies, IP lists and store failure policy.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use vigil_core::ConfigError;
use vigil_core::domain::{RateLimitPolicy, Strategy, Tier};

/// What the gateway does with a request when the rate-limit store cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailMode {
    /// Reject with `StoreUnavailable`.
    #[default]
    Closed,
    /// Skip the rate-limit step and continue.
    Open,
}

impl FailMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailMode::Closed => "closed",
            FailMode::Open => "open",
        }
    }
}

impl fmt::Display for FailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(FailMode::Closed),
            "open" => Ok(FailMode::Open),
            other => Err(ConfigError::Invalid(format!(
                "fail mode must be 'closed' or 'open', got '{other}'"
            ))),
        }
    }
}

/// Exact-address allow and deny lists. An empty allow list admits everyone
/// not denied.
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    allow: HashSet<IpAddr>,
    deny: HashSet<IpAddr>,
}

impl IpFilter {
    /// Parse comma-separated address lists.
    pub fn parse(allow: &str, deny: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            allow: parse_addresses(allow)?,
            deny: parse_addresses(deny)?,
        })
    }

    /// Whether a request from `ip` may proceed. Unknown addresses only pass
    /// when no allow list is configured.
    pub fn permits(&self, ip: Option<IpAddr>) -> bool {
        match ip {
            Some(ip) if self.deny.contains(&ip) => false,
            Some(ip) => self.allow.is_empty() || self.allow.contains(&ip),
            None => self.allow.is_empty(),
        }
    }
}

fn parse_addresses(list: &str) -> Result<HashSet<IpAddr>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|_| ConfigError::Invalid(format!("invalid IP address '{s}'")))
        })
        .collect()
}

/// Rate limit policy per subscription tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPolicies {
    policies: HashMap<Tier, RateLimitPolicy>,
}

impl TierPolicies {
    /// Default tier table under `strategy`, with burst = requests * `burst_multiplier`.
    pub fn defaults(strategy: Strategy, burst_multiplier: u32) -> Result<Self, ConfigError> {
        let mut policies = HashMap::new();
        for tier in Tier::ALL {
            let requests = tier.default_requests();
            let policy = RateLimitPolicy::with_burst(
                requests,
                tier.default_window_seconds(),
                strategy,
                requests.saturating_mul(burst_multiplier),
            )?;
            policies.insert(tier, policy);
        }
        Ok(Self { policies })
    }

    pub fn get(&self, tier: Tier) -> &RateLimitPolicy {
        // Every tier is populated at construction.
        &self.policies[&tier]
    }

    pub fn with(mut self, tier: Tier, policy: RateLimitPolicy) -> Self {
        self.policies.insert(tier, policy);
        self
    }
}

impl Default for TierPolicies {
    fn default() -> Self {
        let policies = Tier::ALL
            .into_iter()
            .map(|tier| (tier, tier.default_policy(Strategy::SlidingWindow)))
            .collect();
        Self { policies }
    }
}

/// Security gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub policies: TierPolicies,
    pub ip_filter: IpFilter,
    pub fail_mode: FailMode,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let strategy = match var("RATE_LIMIT_STRATEGY") {
            Some(s) => s.parse()?,
            None => Strategy::SlidingWindow,
        };
        let burst_multiplier = parse_or(&var, "RATE_LIMIT_BURST_MULTIPLIER", 2u32)?;

        let mut policies = TierPolicies::defaults(strategy, burst_multiplier)?;
        for tier in Tier::ALL {
            let name = tier.as_str().to_ascii_uppercase();
            let requests_var = format!("RATE_LIMIT_{name}_REQUESTS");
            let window_var = format!("RATE_LIMIT_{name}_WINDOW_SECS");
            if var(&requests_var).is_none() && var(&window_var).is_none() {
                continue;
            }

            let requests = parse_or(&var, &requests_var, tier.default_requests())?;
            let window = parse_or(&var, &window_var, tier.default_window_seconds())?;
            let policy = RateLimitPolicy::with_burst(
                requests,
                window,
                strategy,
                requests.saturating_mul(burst_multiplier),
            )?;
            policies = policies.with(tier, policy);
        }

        let ip_filter = IpFilter::parse(
            &var("IP_ALLOWLIST").unwrap_or_default(),
            &var("IP_DENYLIST").unwrap_or_default(),
        )?;
        let fail_mode = match var("RATE_LIMIT_FAIL_MODE") {
            Some(s) => s.parse()?,
            None => FailMode::Closed,
        };

        Ok(Self {
            policies,
            ip_filter,
            fail_mode,
        })
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{name} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}
