//! Signed request descriptor and its canonical string.
//!
//! The canonical string is a wire-level contract shared with other
//! implementations and must stay byte-exact:
//!
//! ```text
//! METHOD\npath\ntimestamp[\nbody_sha256_hex]\nkey1:value1\nkey2:value2...
//! ```
//!
//! Headers are ordered lexicographically by key, byte-wise.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Everything covered by a request signature. Lives for one sign/verify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub path: String,
    pub body_hash: Option<String>,
    /// Unix seconds supplied by the client.
    pub timestamp: i64,
    pub headers: BTreeMap<String, String>,
}

impl SignedRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body_hash: None,
            timestamp,
            headers: BTreeMap::new(),
        }
    }

    /// Build a descriptor from raw request parts, hashing the body if present.
    pub fn from_parts<'a>(
        method: &str,
        path: &str,
        body: Option<&[u8]>,
        timestamp: i64,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut request = Self::new(method, path, timestamp);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        for (key, value) in headers {
            request = request.with_header(key, value);
        }
        request
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body_hash = Some(body_hash(body));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Newline-joined canonical form that the HMAC is computed over.
    pub fn canonical_string(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4 + self.headers.len());
        parts.push(self.method.to_uppercase());
        parts.push(self.path.clone());
        parts.push(self.timestamp.to_string());
        if let Some(hash) = &self.body_hash {
            parts.push(hash.clone());
        }
        parts.extend(self.headers.iter().map(|(k, v)| format!("{k}:{v}")));
        parts.join("\n")
    }
}

/// Lowercase hex SHA-256 of a request body.
pub fn body_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_string_layout() {
        let request = SignedRequest::new("post", "/api/v1/documents", 1_700_000_000)
            .with_body(b"{}")
            .with_header("x-tenant", "acme")
            .with_header("content-type", "application/json");

        let expected = format!(
            "POST\n/api/v1/documents\n1700000000\n{}\ncontent-type:application/json\nx-tenant:acme",
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert_eq!(request.canonical_string(), expected);
    }

    #[test]
    fn test_canonical_string_without_body_or_headers() {
        let request = SignedRequest::new("get", "/health", 42);
        assert_eq!(request.canonical_string(), "GET\n/health\n42");
    }

    #[test]
    fn test_empty_body_is_still_hashed() {
        let request = SignedRequest::from_parts("PUT", "/x", Some(&b""[..]), 1, Vec::new());
        assert_eq!(
            request.body_hash.as_deref(),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }
}
