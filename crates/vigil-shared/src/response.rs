//! RFC 7807 problem details for gateway denials.

use serde::{Deserialize, Serialize};

/// RFC 7807 Problem Details for HTTP APIs.
///
/// See: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type.
    pub title: String,

    /// The HTTP status code.
    pub status: u16,

    /// A human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Seconds the client should wait before retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
            retry_after: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    pub fn forbidden() -> Self {
        Self::new(403, "Forbidden")
    }

    pub fn too_many_requests(retry_after: u64) -> Self {
        Self::new(429, "Too Many Requests")
            .with_detail(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after
            ))
            .with_retry_after(retry_after)
    }

    pub fn service_unavailable() -> Self {
        Self::new(503, "Service Unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_serialization() {
        let body = serde_json::to_value(ErrorResponse::too_many_requests(58)).unwrap();

        assert_eq!(body["type"], "about:blank");
        assert_eq!(body["status"], 429);
        assert_eq!(body["retry_after"], 58);
        assert_eq!(
            body["detail"],
            "Rate limit exceeded. Try again in 58 seconds."
        );
    }

    #[test]
    fn test_optional_fields_skipped() {
        let body = serde_json::to_value(ErrorResponse::forbidden()).unwrap();
        assert!(body.get("detail").is_none());
        assert!(body.get("retry_after").is_none());
    }
}
