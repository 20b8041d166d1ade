//! Application configuration loaded from environment variables.

use std::env;

use vigil_core::ConfigError;
use vigil_infra::{CsrfConfig, GatewayConfig, RateLimitConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub rate_limit: RateLimitConfig,
    pub csrf: CsrfConfig,
    /// Accepted signature age in seconds.
    pub max_request_age_secs: i64,
    /// Redis URL, when a shared store is configured.
    pub redis_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            gateway: GatewayConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env(),
            csrf: CsrfConfig::from_env(),
            max_request_age_secs: env::var("REQUEST_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
        })
    }
}
