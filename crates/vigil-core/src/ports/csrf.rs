//! CSRF token port.

use async_trait::async_trait;

use crate::ports::StoreError;

/// Issues and validates one-time CSRF tokens scoped to a session.
#[async_trait]
pub trait CsrfTokenStore: Send + Sync {
    async fn issue(&self, session_id: &str) -> Result<String, CsrfError>;

    /// `Ok(false)` for missing, expired or already-consumed tokens.
    /// With `consume`, at most one concurrent caller gets `Ok(true)`.
    async fn validate(&self, session_id: &str, token: &str, consume: bool)
    -> Result<bool, CsrfError>;

    /// Purge expired tokens. Returns the number removed.
    async fn sweep(&self) -> Result<usize, CsrfError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("CSRF token store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Token serialization failed: {0}")]
    Serialization(String),
}
