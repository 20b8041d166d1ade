//! Security response headers. Values are a conformance contract and must
//! match byte-for-byte.

pub const SECURITY_HEADERS: [(&str, &str); 7] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    (
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains",
    ),
    ("Content-Security-Policy", "default-src 'self'"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
    (
        "Permissions-Policy",
        "geolocation=(), microphone=(), camera=()",
    ),
];

/// Header carrying a request signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";
/// Header carrying the unix timestamp a signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_header_values() {
        let lookup = |name: &str| {
            SECURITY_HEADERS
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| *v)
        };

        assert_eq!(lookup("X-Frame-Options"), Some("DENY"));
        assert_eq!(lookup("X-XSS-Protection"), Some("1; mode=block"));
        assert_eq!(
            lookup("Strict-Transport-Security"),
            Some("max-age=31536000; includeSubDomains")
        );
        assert_eq!(lookup("Content-Security-Policy"), Some("default-src 'self'"));
        assert_eq!(
            lookup("Permissions-Policy"),
            Some("geolocation=(), microphone=(), camera=()")
        );
    }
}
