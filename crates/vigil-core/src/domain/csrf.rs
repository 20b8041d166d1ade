//! CSRF token records.

use serde::{Deserialize, Serialize};

/// A one-time token bound to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrfToken {
    pub session_id: String,
    pub token: String,
    /// Unix seconds.
    pub issued_at: f64,
    /// Unix seconds.
    pub expires_at: f64,
}

impl CsrfToken {
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at
    }

    /// Store key for a `(session_id, token)` pair.
    ///
    /// The session id is length-prefixed so ids containing `:` cannot
    /// collide with another pair's key.
    pub fn storage_key(prefix: &str, session_id: &str, token: &str) -> String {
        format!("{prefix}:{}:{session_id}:{token}", session_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let token = CsrfToken {
            session_id: "s1".to_string(),
            token: "t".to_string(),
            issued_at: 0.0,
            expires_at: 10.0,
        };
        assert!(!token.is_expired(9.999));
        assert!(token.is_expired(10.0));
    }

    #[test]
    fn test_storage_key_is_composite() {
        assert_eq!(CsrfToken::storage_key("csrf", "abc", "xyz"), "csrf:3:abc:xyz");
    }

    #[test]
    fn test_storage_key_separates_colon_sessions() {
        assert_ne!(
            CsrfToken::storage_key("csrf", "tenant:alice", "tok"),
            CsrfToken::storage_key("csrf", "tenant", "alice:tok"),
        );
    }
}
