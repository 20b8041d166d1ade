//! Domain-level error types.

use thiserror::Error;

/// Invalid configuration, raised when a policy or tier table is built.
///
/// A value that fails here never reaches the request path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Rate limit window must be greater than zero")]
    ZeroWindow,

    #[error("Burst size must be at least 1 when requests > 0")]
    ZeroBurst,

    #[error("Unknown rate limit strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown subscription tier: {0}")]
    UnknownTier(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
