//! Gateway outcomes and their HTTP mapping.

use std::collections::BTreeMap;
use std::fmt;

use vigil_core::domain::RateLimitDecision;
use vigil_shared::ErrorResponse;

/// Why the gateway refused a request. Each reason maps to one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    IpBlocked,
    RateLimited,
    CsrfInvalid,
    StoreUnavailable,
}

impl DenialReason {
    pub fn status_code(&self) -> u16 {
        match self {
            DenialReason::IpBlocked | DenialReason::CsrfInvalid => 403,
            DenialReason::RateLimited => 429,
            DenialReason::StoreUnavailable => 503,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::IpBlocked => "ip_blocked",
            DenialReason::RateLimited => "rate_limited",
            DenialReason::CsrfInvalid => "csrf_invalid",
            DenialReason::StoreUnavailable => "store_unavailable",
        }
    }

    /// RFC 7807 body for this denial.
    pub fn problem(&self, decision: Option<&RateLimitDecision>) -> ErrorResponse {
        match self {
            DenialReason::IpBlocked => {
                ErrorResponse::forbidden().with_detail("Requests from this address are not allowed.")
            }
            DenialReason::CsrfInvalid => {
                ErrorResponse::forbidden().with_detail("Missing or invalid CSRF token.")
            }
            DenialReason::RateLimited => ErrorResponse::too_many_requests(
                decision.map(RateLimitDecision::retry_after_secs).unwrap_or(0),
            ),
            DenialReason::StoreUnavailable => ErrorResponse::service_unavailable()
                .with_detail("Admission control is temporarily unavailable."),
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayVerdict {
    pub allow: bool,
    /// Response headers: security headers always, rate-limit headers once
    /// the rate-limit step ran.
    pub headers: BTreeMap<String, String>,
    pub denial: Option<DenialReason>,
    pub decision: Option<RateLimitDecision>,
}

impl GatewayVerdict {
    pub fn status_code(&self) -> u16 {
        self.denial.map(|d| d.status_code()).unwrap_or(200)
    }

    pub fn problem(&self) -> Option<ErrorResponse> {
        self.denial.map(|d| d.problem(self.decision.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DenialReason::IpBlocked.status_code(), 403);
        assert_eq!(DenialReason::RateLimited.status_code(), 429);
        assert_eq!(DenialReason::CsrfInvalid.status_code(), 403);
        assert_eq!(DenialReason::StoreUnavailable.status_code(), 503);
    }

    #[test]
    fn test_rate_limited_problem_carries_retry_after() {
        let decision = RateLimitDecision::deny(2, 60.0, 57.2);
        let problem = DenialReason::RateLimited.problem(Some(&decision));

        assert_eq!(problem.status, 429);
        assert_eq!(problem.retry_after, Some(58));
    }

    #[test]
    fn test_allowed_verdict_has_no_problem() {
        let verdict = GatewayVerdict {
            allow: true,
            headers: BTreeMap::new(),
            denial: None,
            decision: None,
        };
        assert_eq!(verdict.status_code(), 200);
        assert!(verdict.problem().is_none());
    }
}
