//! Policy dry runs: replay a synthetic request trace through the gateway.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use serde::Serialize;

use vigil_core::ConfigError;
use vigil_core::domain::{RateLimitPolicy, Strategy, Tier};
use vigil_core::ports::{Clock, CounterStore, ManualClock, SystemClock};
use vigil_infra::{
    GatewayConfig, InMemoryCounterStore, RedisConfig, RedisCounterStore, RequestContext,
    SecurityGateway, StoreCsrfTokens, StoreRateLimiter,
};

use crate::config::AppConfig;

/// Shape of the synthetic trace.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub tier: Tier,
    pub strategy: Option<Strategy>,
    pub limit: Option<u32>,
    pub window_secs: Option<u64>,
    pub burst: Option<u32>,
    pub requests: u32,
    pub identifiers: u32,
    pub concurrency: usize,
    pub interval: Duration,
    pub method: String,
    /// Real clock and real sleeps, against Redis when configured.
    pub live: bool,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub tier: Tier,
    pub policy: RateLimitPolicy,
    pub total: u32,
    pub allowed: u32,
    pub denied: BTreeMap<String, u32>,
    /// Seconds into the trace at which the first denial happened.
    pub first_denial_secs: Option<f64>,
    pub last_headers: BTreeMap<String, String>,
}

/// Effective policy for the simulated tier after command-line overrides.
pub fn effective_policy(
    gateway: &GatewayConfig,
    options: &SimulationOptions,
) -> Result<RateLimitPolicy, ConfigError> {
    let base = gateway.policies.get(options.tier);
    let requests = options.limit.unwrap_or(base.requests());
    let burst = match (options.burst, options.limit) {
        (Some(burst), _) => burst,
        (None, Some(limit)) => limit.saturating_mul(2),
        (None, None) => base.burst_size(),
    };

    RateLimitPolicy::with_burst(
        requests,
        options.window_secs.unwrap_or(base.window_seconds()),
        options.strategy.unwrap_or(base.strategy()),
        burst,
    )
}

async fn open_store(
    config: &AppConfig,
    options: &SimulationOptions,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn CounterStore>> {
    if let (true, Some(url)) = (options.live, &config.redis_url) {
        let redis_config = RedisConfig {
            url: url.clone(),
            ..RedisConfig::from_env()
        };
        let store = RedisCounterStore::new(redis_config)
            .await
            .context("failed to connect to Redis")?;
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(InMemoryCounterStore::with_clock(clock)))
}

pub async fn run(config: &AppConfig, options: &SimulationOptions) -> anyhow::Result<SimulationReport> {
    let policy = effective_policy(&config.gateway, options).context("invalid policy override")?;

    let manual = (!options.live).then(|| Arc::new(ManualClock::at(SystemClock.now())));
    let clock: Arc<dyn Clock> = match &manual {
        Some(manual) => manual.clone(),
        None => Arc::new(SystemClock),
    };

    let store = open_store(config, options, clock.clone()).await?;
    let limiter =
        StoreRateLimiter::new(store.clone(), config.rate_limit.clone()).with_clock(clock.clone());
    let csrf =
        Arc::new(StoreCsrfTokens::new(store, config.csrf.clone()).with_clock(clock.clone()));
    let gateway_config = GatewayConfig {
        policies: config.gateway.policies.clone().with(options.tier, policy.clone()),
        ..config.gateway.clone()
    };
    let gateway = SecurityGateway::new(Arc::new(limiter), csrf.clone(), gateway_config);

    // Redis expires keys itself; the in-memory store needs the sweep.
    let sweeper = (options.live && config.redis_url.is_none())
        .then(|| csrf.clone().spawn_sweeper());

    tracing::info!(
        tier = %options.tier,
        strategy = %policy.strategy(),
        limit = policy.requests(),
        window_secs = policy.window_seconds(),
        requests = options.requests,
        live = options.live,
        "Starting simulation"
    );

    let result = replay(&gateway, clock.as_ref(), manual.as_deref(), options, policy).await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    let report = result?;

    tracing::info!(
        allowed = report.allowed,
        denied = report.total - report.allowed,
        "Simulation finished"
    );
    Ok(report)
}

async fn replay(
    gateway: &SecurityGateway,
    clock: &dyn Clock,
    manual: Option<&ManualClock>,
    options: &SimulationOptions,
    policy: RateLimitPolicy,
) -> anyhow::Result<SimulationReport> {
    let identifiers = options.identifiers.max(1);
    let concurrency = options.concurrency.max(1) as u32;
    let mut report = SimulationReport {
        tier: options.tier,
        policy,
        total: 0,
        allowed: 0,
        denied: BTreeMap::new(),
        first_denial_secs: None,
        last_headers: BTreeMap::new(),
    };
    let started = clock.now();

    while report.total < options.requests {
        let batch = concurrency.min(options.requests - report.total);
        let verdicts = join_all((report.total..report.total + batch).map(|n| {
            async move {
                let user = n % identifiers;
                let mut ctx = RequestContext::new(options.method.as_str(), "/simulate")
                    .with_identifier(format!("user-{user}"))
                    .with_tier(options.tier);
                if ctx.is_state_changing() {
                    let session = format!("session-{user}");
                    let token = gateway.issue_csrf_token(&session).await?;
                    ctx = ctx.with_session(session).with_csrf_token(token);
                }
                anyhow::Ok(gateway.evaluate(&ctx).await)
            }
        }))
        .await;

        for verdict in verdicts {
            let verdict = verdict.context("failed to issue CSRF token")?;
            report.total += 1;
            match verdict.denial {
                None => report.allowed += 1,
                Some(reason) => {
                    *report.denied.entry(reason.to_string()).or_default() += 1;
                    report
                        .first_denial_secs
                        .get_or_insert_with(|| clock.now() - started);
                }
            }
            report.last_headers = verdict.headers;
        }

        match manual {
            Some(manual) => manual.advance(options.interval),
            None => tokio::time::sleep(options.interval).await,
        }
    }

    Ok(report)
}
