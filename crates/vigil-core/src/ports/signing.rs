//! Request signing port.

use crate::domain::SignedRequest;

/// Stateless request signer.
pub trait RequestSigner: Send + Sync {
    /// Lowercase hex signature over the canonical string.
    fn sign(&self, request: &SignedRequest) -> String;

    /// Freshness check followed by a constant-time signature comparison.
    fn verify(
        &self,
        signature: &str,
        request: &SignedRequest,
        max_age_secs: i64,
    ) -> Result<(), SignatureError>;
}

/// Signature verification failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid request signature")]
    InvalidSignature,

    /// Outside the freshness window. A negative age is a future-dated request.
    #[error("Request timestamp outside freshness window (age {age_secs}s)")]
    ExpiredRequest { age_secs: i64 },

    #[error("Signing secret is empty")]
    MalformedSecret,
}

impl SignatureError {
    pub fn status_code(&self) -> u16 {
        match self {
            SignatureError::InvalidSignature | SignatureError::ExpiredRequest { .. } => 401,
            SignatureError::MalformedSecret => 500,
        }
    }
}
