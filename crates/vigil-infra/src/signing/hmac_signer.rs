//! HMAC-SHA256 request signer.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use vigil_core::domain::SignedRequest;
use vigil_core::ports::{Clock, RequestSigner, SignatureError, SystemClock};
use vigil_shared::headers::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Signs the canonical string of a request with a shared secret.
///
/// The keyed MAC is built once; each call clones the initialized state.
pub struct HmacRequestSigner {
    mac: HmacSha256,
    clock: Arc<dyn Clock>,
}

impl HmacRequestSigner {
    pub fn new(secret: &[u8]) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::MalformedSecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::MalformedSecret)?;

        Ok(Self {
            mac,
            clock: Arc::new(SystemClock),
        })
    }

    /// Reads the secret from `REQUEST_SIGNING_SECRET`.
    pub fn from_env() -> Result<Self, SignatureError> {
        let secret = std::env::var("REQUEST_SIGNING_SECRET").unwrap_or_default();
        if secret.is_empty() {
            tracing::error!("REQUEST_SIGNING_SECRET is not set; request signing is unavailable");
        }
        Self::new(secret.as_bytes())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn digest(&self, request: &SignedRequest) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(request.canonical_string().as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Headers a client attaches to a signed request.
    pub fn signature_headers(&self, request: &SignedRequest) -> [(&'static str, String); 2] {
        [
            (SIGNATURE_HEADER, self.sign(request)),
            (TIMESTAMP_HEADER, request.timestamp.to_string()),
        ]
    }

    /// Verify against an explicit `now` in unix seconds.
    pub fn verify_at(
        &self,
        signature: &str,
        request: &SignedRequest,
        max_age_secs: i64,
        now: i64,
    ) -> Result<(), SignatureError> {
        let age_secs = now.saturating_sub(request.timestamp);
        if age_secs > max_age_secs || age_secs < 0 {
            tracing::warn!(
                age_secs,
                max_age_secs,
                method = %request.method,
                path = %request.path,
                "Rejected request outside freshness window"
            );
            return Err(SignatureError::ExpiredRequest { age_secs });
        }

        // Malformed hex compares against an empty slice and fails like any mismatch.
        let provided = hex::decode(signature.trim()).unwrap_or_default();
        let expected = self.digest(request);
        if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            Ok(())
        } else {
            tracing::warn!(
                method = %request.method,
                path = %request.path,
                "Rejected request with invalid signature"
            );
            Err(SignatureError::InvalidSignature)
        }
    }
}

impl RequestSigner for HmacRequestSigner {
    fn sign(&self, request: &SignedRequest) -> String {
        hex::encode(self.digest(request))
    }

    fn verify(
        &self,
        signature: &str,
        request: &SignedRequest,
        max_age_secs: i64,
    ) -> Result<(), SignatureError> {
        let now = self.clock.now().floor() as i64;
        self.verify_at(signature, request, max_age_secs, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::ports::ManualClock;

    const NOW: i64 = 1_700_000_000;

    fn signer() -> HmacRequestSigner {
        HmacRequestSigner::new(b"test-secret")
            .unwrap()
            .with_clock(Arc::new(ManualClock::at(NOW as f64)))
    }

    fn request(timestamp: i64) -> SignedRequest {
        SignedRequest::new("POST", "/api/v1/assessments", timestamp)
            .with_body(br#"{"score":42}"#)
            .with_header("x-tenant", "acme")
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = signer();
        let req = request(NOW);
        let signature = signer.sign(&req);

        assert_eq!(signature.len(), 64);
        assert!(signer.verify(&signature, &req, 300).is_ok());
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2.
        let signer = HmacRequestSigner::new(b"Jefe").unwrap();
        let mut mac = signer.mac.clone();
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_any_mutation_invalidates_signature() {
        let signer = signer();
        let original = request(NOW);
        let signature = signer.sign(&original);

        let mutations = [
            SignedRequest {
                method: "PUT".to_string(),
                ..original.clone()
            },
            SignedRequest {
                path: "/api/v1/other".to_string(),
                ..original.clone()
            },
            original.clone().with_body(br#"{"score":43}"#),
            SignedRequest {
                timestamp: NOW - 1,
                ..original.clone()
            },
            original.clone().with_header("x-tenant", "evil"),
            original.clone().with_header("x-extra", "1"),
        ];

        for mutated in mutations {
            assert_eq!(
                signer.verify(&signature, &mutated, 300),
                Err(SignatureError::InvalidSignature),
                "mutation accepted: {}",
                mutated.canonical_string()
            );
        }
    }

    #[test]
    fn test_freshness_boundaries() {
        let signer = signer();

        let stale = request(NOW - 300 - 1);
        assert_eq!(
            signer.verify(&signer.sign(&stale), &stale, 300),
            Err(SignatureError::ExpiredRequest { age_secs: 301 })
        );

        let fresh = request(NOW - 300 + 1);
        assert!(signer.verify(&signer.sign(&fresh), &fresh, 300).is_ok());

        let edge = request(NOW - 300);
        assert!(signer.verify(&signer.sign(&edge), &edge, 300).is_ok());
    }

    #[test]
    fn test_future_dated_request_rejected() {
        let signer = signer();
        let req = request(NOW + 5);
        assert_eq!(
            signer.verify(&signer.sign(&req), &req, 300),
            Err(SignatureError::ExpiredRequest { age_secs: -5 })
        );
    }

    #[test]
    fn test_malformed_signature_is_invalid() {
        let signer = signer();
        let req = request(NOW);
        let zeros = "0".repeat(64);
        for bad in ["", "zz", "abc", zeros.as_str()] {
            assert_eq!(
                signer.verify(bad, &req, 300),
                Err(SignatureError::InvalidSignature)
            );
        }
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            HmacRequestSigner::new(b""),
            Err(SignatureError::MalformedSecret)
        ));
    }

    #[test]
    fn test_signature_headers() {
        let signer = signer();
        let req = request(NOW);
        let headers = signer.signature_headers(&req);

        assert_eq!(headers[0].0, "X-Signature");
        assert_eq!(headers[0].1, signer.sign(&req));
        assert_eq!(headers[1], ("X-Timestamp", NOW.to_string()));
    }

    #[test]
    fn test_different_secrets_disagree() {
        let other = HmacRequestSigner::new(b"other-secret").unwrap();
        let req = request(NOW);
        assert_ne!(signer().sign(&req), other.sign(&req));
    }
}
