//! Security gateway - the per-request composition of IP filtering, rate
//! limiting and CSRF validation.

mod config;
mod verdict;

pub use config::{FailMode, GatewayConfig, IpFilter, TierPolicies};
pub use verdict::{DenialReason, GatewayVerdict};

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use vigil_core::domain::{RateLimitDecision, Tier};
use vigil_core::ports::{CsrfError, CsrfTokenStore, RateLimiter};
use vigil_shared::SECURITY_HEADERS;

/// The parts of an inbound request the gateway looks at.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub client_ip: Option<IpAddr>,
    /// User id or API key. Falls back to the client IP when absent.
    pub identifier: Option<String>,
    pub tier: Tier,
    pub session_id: Option<String>,
    pub csrf_token: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            client_ip: None,
            identifier: None,
            tier: Tier::Free,
            session_id: None,
            csrf_token: None,
        }
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// POST, PUT, PATCH and DELETE require a CSRF token.
    pub fn is_state_changing(&self) -> bool {
        matches!(
            self.method.to_ascii_uppercase().as_str(),
            "POST" | "PUT" | "PATCH" | "DELETE"
        )
    }

    pub fn rate_limit_key(&self) -> String {
        match (&self.identifier, self.client_ip) {
            (Some(id), _) => id.clone(),
            (None, Some(ip)) => ip.to_string(),
            (None, None) => "anonymous".to_string(),
        }
    }
}

/// Admission control for one inbound request at a time, shared across tasks.
pub struct SecurityGateway {
    limiter: Arc<dyn RateLimiter>,
    csrf: Arc<dyn CsrfTokenStore>,
    config: GatewayConfig,
}

impl SecurityGateway {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        csrf: Arc<dyn CsrfTokenStore>,
        config: GatewayConfig,
    ) -> Self {
        tracing::info!(fail_mode = %config.fail_mode, "Security gateway initialized");
        Self {
            limiter,
            csrf,
            config,
        }
    }

    /// Issue a CSRF token for `session_id`.
    pub async fn issue_csrf_token(&self, session_id: &str) -> Result<String, CsrfError> {
        self.csrf.issue(session_id).await
    }

    /// Run IP filter, rate limit and CSRF checks in order, stopping at the
    /// first denial. Security headers are attached to every verdict.
    pub async fn evaluate(&self, ctx: &RequestContext) -> GatewayVerdict {
        let mut headers: BTreeMap<String, String> = SECURITY_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        if !self.config.ip_filter.permits(ctx.client_ip) {
            tracing::warn!(
                client_ip = ?ctx.client_ip,
                path = %ctx.path,
                reason = %DenialReason::IpBlocked,
                "Request denied"
            );
            return deny(headers, DenialReason::IpBlocked, None);
        }

        let identifier = ctx.rate_limit_key();
        let policy = self.config.policies.get(ctx.tier);
        let decision = match self.limiter.check_and_consume(&identifier, policy).await {
            Ok(decision) => {
                headers.extend(
                    decision
                        .headers()
                        .into_iter()
                        .map(|(name, value)| (name.to_string(), value)),
                );
                if !decision.allowed {
                    tracing::warn!(
                        identifier = %identifier,
                        tier = %ctx.tier,
                        retry_after = decision.retry_after_secs(),
                        reason = %DenialReason::RateLimited,
                        "Request denied"
                    );
                    return deny(headers, DenialReason::RateLimited, Some(decision));
                }
                Some(decision)
            }
            Err(e) => match self.config.fail_mode {
                FailMode::Closed => {
                    tracing::error!(
                        identifier = %identifier,
                        error = %e,
                        reason = %DenialReason::StoreUnavailable,
                        "Request denied"
                    );
                    return deny(headers, DenialReason::StoreUnavailable, None);
                }
                FailMode::Open => {
                    tracing::warn!(
                        identifier = %identifier,
                        error = %e,
                        "Rate limit store unavailable, admitting request"
                    );
                    None
                }
            },
        };

        if ctx.is_state_changing() {
            let (Some(session_id), Some(token)) = (&ctx.session_id, &ctx.csrf_token) else {
                tracing::warn!(
                    path = %ctx.path,
                    reason = %DenialReason::CsrfInvalid,
                    "Request denied: CSRF token or session missing"
                );
                return deny(headers, DenialReason::CsrfInvalid, decision);
            };

            match self.csrf.validate(session_id, token, true).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        session_id = %session_id,
                        path = %ctx.path,
                        reason = %DenialReason::CsrfInvalid,
                        "Request denied"
                    );
                    return deny(headers, DenialReason::CsrfInvalid, decision);
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %e,
                        reason = %DenialReason::StoreUnavailable,
                        "Request denied"
                    );
                    return deny(headers, DenialReason::StoreUnavailable, decision);
                }
            }
        }

        GatewayVerdict {
            allow: true,
            headers,
            denial: None,
            decision,
        }
    }
}

fn deny(
    headers: BTreeMap<String, String>,
    reason: DenialReason,
    decision: Option<RateLimitDecision>,
) -> GatewayVerdict {
    GatewayVerdict {
        allow: false,
        headers,
        denial: Some(reason),
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::{CsrfConfig, StoreCsrfTokens};
    use crate::rate_limit::{RateLimitConfig, StoreRateLimiter};
    use crate::store::InMemoryCounterStore;
    use async_trait::async_trait;
    use vigil_core::domain::{RateLimitPolicy, Strategy};
    use vigil_core::ports::{ManualClock, RateLimitError, StoreError};

    fn gateway_with(config: GatewayConfig) -> SecurityGateway {
        let clock = Arc::new(ManualClock::at(1_000.0));
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let limiter = StoreRateLimiter::new(store.clone(), RateLimitConfig::default())
            .with_clock(clock.clone());
        let csrf = StoreCsrfTokens::new(store, CsrfConfig::default()).with_clock(clock);
        SecurityGateway::new(Arc::new(limiter), Arc::new(csrf), config)
    }

    fn two_per_minute() -> GatewayConfig {
        let policy = RateLimitPolicy::new(2, 60, Strategy::SlidingWindow).unwrap();
        GatewayConfig {
            policies: TierPolicies::default().with(Tier::Free, policy),
            ..GatewayConfig::default()
        }
    }

    fn assert_security_headers(verdict: &GatewayVerdict) {
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(verdict.headers.get(name).map(String::as_str), Some(value));
        }
    }

    #[test]
    fn test_request_context_helpers() {
        let ctx = RequestContext::new("patch", "/x");
        assert!(ctx.is_state_changing());
        assert_eq!(ctx.rate_limit_key(), "anonymous");
        assert!(!RequestContext::new("GET", "/x").is_state_changing());
        assert!(!RequestContext::new("OPTIONS", "/x").is_state_changing());

        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let ctx = RequestContext::new("GET", "/x").with_client_ip(ip);
        assert_eq!(ctx.rate_limit_key(), "203.0.113.7");
        assert_eq!(ctx.with_identifier("user-1").rate_limit_key(), "user-1");
    }

    #[tokio::test]
    async fn test_allowed_request_carries_all_headers() {
        let gateway = gateway_with(two_per_minute());
        let ctx = RequestContext::new("GET", "/reports").with_identifier("user-1");

        let verdict = gateway.evaluate(&ctx).await;
        assert!(verdict.allow);
        assert_eq!(verdict.status_code(), 200);
        assert_security_headers(&verdict);
        assert_eq!(verdict.headers["X-RateLimit-Limit"], "2");
        assert_eq!(verdict.headers["X-RateLimit-Remaining"], "1");
        assert!(!verdict.headers.contains_key("Retry-After"));
    }

    #[tokio::test]
    async fn test_rate_limited_request() {
        let gateway = gateway_with(two_per_minute());
        let ctx = RequestContext::new("GET", "/reports").with_identifier("user-1");

        gateway.evaluate(&ctx).await;
        gateway.evaluate(&ctx).await;
        let verdict = gateway.evaluate(&ctx).await;

        assert!(!verdict.allow);
        assert_eq!(verdict.denial, Some(DenialReason::RateLimited));
        assert_eq!(verdict.status_code(), 429);
        assert_eq!(verdict.headers["Retry-After"], "60");
        assert_eq!(verdict.headers["X-RateLimit-Remaining"], "0");
        assert_security_headers(&verdict);
        assert_eq!(verdict.problem().unwrap().retry_after, Some(60));
    }

    #[tokio::test]
    async fn test_blocked_ip_short_circuits() {
        let config = GatewayConfig {
            ip_filter: IpFilter::parse("", "198.51.100.9").unwrap(),
            ..two_per_minute()
        };
        let gateway = gateway_with(config);
        let ctx = RequestContext::new("GET", "/")
            .with_client_ip("198.51.100.9".parse().unwrap());

        let verdict = gateway.evaluate(&ctx).await;
        assert_eq!(verdict.denial, Some(DenialReason::IpBlocked));
        assert_eq!(verdict.status_code(), 403);
        assert!(verdict.decision.is_none());
        assert!(!verdict.headers.contains_key("X-RateLimit-Limit"));
        assert_security_headers(&verdict);
    }

    #[tokio::test]
    async fn test_state_changing_requests_need_a_valid_token() {
        let gateway = gateway_with(GatewayConfig::default());
        let token = gateway.issue_csrf_token("session-1").await.unwrap();

        let missing = RequestContext::new("POST", "/documents").with_session("session-1");
        let verdict = gateway.evaluate(&missing).await;
        assert_eq!(verdict.denial, Some(DenialReason::CsrfInvalid));
        // The rate-limit step ran before the CSRF check.
        assert!(verdict.headers.contains_key("X-RateLimit-Limit"));

        let ctx = missing.clone().with_csrf_token(token);
        assert!(gateway.evaluate(&ctx).await.allow);

        // One-time: replaying the same token fails.
        let replay = gateway.evaluate(&ctx).await;
        assert_eq!(replay.denial, Some(DenialReason::CsrfInvalid));
        assert_eq!(replay.status_code(), 403);
    }

    struct FailingLimiter;

    #[async_trait]
    impl RateLimiter for FailingLimiter {
        async fn check_and_consume(
            &self,
            _identifier: &str,
            _policy: &RateLimitPolicy,
        ) -> Result<RateLimitDecision, RateLimitError> {
            Err(RateLimitError::StoreUnavailable(StoreError::Unavailable(
                "connection reset".to_string(),
            )))
        }
    }

    fn gateway_with_failing_limiter(fail_mode: FailMode) -> SecurityGateway {
        let store = Arc::new(InMemoryCounterStore::new());
        let csrf = StoreCsrfTokens::new(store, CsrfConfig::default());
        let config = GatewayConfig {
            fail_mode,
            ..GatewayConfig::default()
        };
        SecurityGateway::new(Arc::new(FailingLimiter), Arc::new(csrf), config)
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed_by_default() {
        let gateway = gateway_with_failing_limiter(FailMode::Closed);
        let verdict = gateway.evaluate(&RequestContext::new("GET", "/")).await;

        assert!(!verdict.allow);
        assert_eq!(verdict.denial, Some(DenialReason::StoreUnavailable));
        assert_eq!(verdict.status_code(), 503);
        assert_security_headers(&verdict);
    }

    #[tokio::test]
    async fn test_store_outage_fail_open_admits() {
        let gateway = gateway_with_failing_limiter(FailMode::Open);
        let verdict = gateway.evaluate(&RequestContext::new("GET", "/")).await;

        assert!(verdict.allow);
        assert!(verdict.decision.is_none());
    }
}
