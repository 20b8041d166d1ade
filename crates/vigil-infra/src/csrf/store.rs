//! CSRF tokens persisted through a `CounterStore`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::task::JoinHandle;

use vigil_core::domain::CsrfToken;
use vigil_core::ports::{Clock, CounterStore, CsrfError, CsrfTokenStore, SystemClock};

use crate::store::with_deadline;

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// CSRF token store configuration.
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Token lifetime.
    pub token_ttl: Duration,
    /// Key prefix for token records.
    pub key_prefix: String,
    /// Deadline for a single store call.
    pub store_timeout: Duration,
    /// Period of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(3600),
            key_prefix: "csrf".to_string(),
            store_timeout: Duration::from_millis(250),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CsrfConfig {
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Self {
            token_ttl: Duration::from_secs(secs("CSRF_TOKEN_TTL_SECS", 3600)),
            key_prefix: std::env::var("CSRF_KEY_PREFIX").unwrap_or_else(|_| "csrf".to_string()),
            store_timeout: Duration::from_millis(secs("STORE_TIMEOUT_MS", 250)),
            sweep_interval: Duration::from_secs(secs("CSRF_SWEEP_INTERVAL_SECS", 60)),
        }
    }
}

/// One-time CSRF tokens scoped to a session.
///
/// Consumption goes through `CounterStore::take`, so concurrent validators
/// of the same token see at most one success.
pub struct StoreCsrfTokens {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    config: CsrfConfig,
}

impl StoreCsrfTokens {
    pub fn new(store: Arc<dyn CounterStore>, config: CsrfConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the background expiry sweep at the configured interval.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval;
        super::spawn_sweeper(self, interval)
    }

    fn generate_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[async_trait]
impl CsrfTokenStore for StoreCsrfTokens {
    async fn issue(&self, session_id: &str) -> Result<String, CsrfError> {
        let now = self.clock.now();
        let token = Self::generate_token();
        let record = CsrfToken {
            session_id: session_id.to_string(),
            token: token.clone(),
            issued_at: now,
            expires_at: now + self.config.token_ttl.as_secs_f64(),
        };
        let raw = serde_json::to_string(&record).map_err(|e| CsrfError::Serialization(e.to_string()))?;
        let key = CsrfToken::storage_key(&self.config.key_prefix, session_id, &token);

        with_deadline(
            self.config.store_timeout,
            self.store.set(&key, &raw, self.config.token_ttl),
        )
        .await
        .inspect_err(|e| tracing::error!(session_id = %session_id, error = %e, "Failed to store CSRF token"))?;

        tracing::debug!(session_id = %session_id, "Issued CSRF token");
        Ok(token)
    }

    async fn validate(
        &self,
        session_id: &str,
        token: &str,
        consume: bool,
    ) -> Result<bool, CsrfError> {
        if session_id.is_empty() || token.is_empty() {
            tracing::debug!(session_id = %session_id, reason = "missing", "CSRF token rejected");
            return Ok(false);
        }

        let key = CsrfToken::storage_key(&self.config.key_prefix, session_id, token);
        let lookup = if consume {
            with_deadline(self.config.store_timeout, self.store.take(&key)).await
        } else {
            with_deadline(self.config.store_timeout, self.store.get(&key)).await
        };
        let raw = lookup.inspect_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "CSRF token lookup failed")
        })?;

        let Some(raw) = raw else {
            tracing::debug!(
                session_id = %session_id,
                reason = "unknown_or_consumed",
                "CSRF token rejected"
            );
            return Ok(false);
        };

        let record: CsrfToken =
            serde_json::from_str(&raw).map_err(|e| CsrfError::Serialization(e.to_string()))?;

        if record.session_id != session_id || record.token != token {
            tracing::warn!(session_id = %session_id, reason = "session_mismatch", "CSRF token rejected");
            return Ok(false);
        }
        if record.is_expired(self.clock.now()) {
            tracing::debug!(session_id = %session_id, reason = "expired", "CSRF token rejected");
            return Ok(false);
        }

        Ok(true)
    }

    async fn sweep(&self) -> Result<usize, CsrfError> {
        let purged = with_deadline(self.config.store_timeout, self.store.purge_expired()).await?;
        Ok(purged)
    }
}
