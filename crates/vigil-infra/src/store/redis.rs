//! Redis counter store with connection pooling and scripted atomic updates.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use uuid::Uuid;

use vigil_core::domain::window::sliding_cutoff;
use vigil_core::domain::{BucketState, WindowSample};
use vigil_core::ports::{CounterStore, StoreError};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Prefix applied to every key this store touches
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            key_prefix: "vigil".to_string(),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            key_prefix: std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "vigil".to_string()),
        }
    }
}

/// INCR with expiry set only when the counter is created.
const INCREMENT_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

/// Trim, conditional add and oldest-score lookup in one round trip.
/// Returns: [admitted, count, oldest_score_or_empty]
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = ARGV[1]
local cutoff = ARGV[2]
local limit = tonumber(ARGV[3])
local ttl_ms = ARGV[4]
local member = ARGV[5]

redis.call('ZREMRANGEBYSCORE', key, '-inf', cutoff)
local count = redis.call('ZCARD', key)
local admitted = 0
if count < limit then
    redis.call('ZADD', key, now, member)
    redis.call('PEXPIRE', key, ttl_ms)
    count = count + 1
    admitted = 1
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_score = ''
if oldest[2] then
    oldest_score = oldest[2]
end
return {admitted, count, oldest_score}
"#;

/// Redis-backed counter store.
///
/// Counters and the sliding-window log are updated by Lua scripts, so each
/// call commits entirely or not at all. Token-bucket state uses the default
/// get-then-save sequence: two callers racing on one identifier can both read
/// the same token count, over-admitting by at most one request per racer.
/// This is accepted for throughput; CSRF consumption uses `GETDEL` and has no
/// such window.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisConfig,
    increment: Script,
    sliding_window: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            config,
            increment: Script::new(INCREMENT_SCRIPT),
            sliding_window: Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

fn store_error(e: RedisError) -> StoreError {
    if e.code() == Some("WRONGTYPE") {
        StoreError::WrongType {
            key: e.detail().unwrap_or_default().to_string(),
        }
    } else {
        tracing::error!(error = %e, "Redis command failed");
        StoreError::Unavailable(e.to_string())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        self.increment
            .key(self.make_key(key))
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn add_timestamp_trim(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowSample, StoreError> {
        let mut conn = self.conn.clone();
        let member = format!("{}-{}", now, Uuid::new_v4());

        let (admitted, count, oldest): (i64, u64, String) = self
            .sliding_window
            .key(self.make_key(key))
            .arg(now.to_string())
            .arg(sliding_cutoff(now, window).to_string())
            .arg(limit)
            .arg(ttl_millis(window))
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        let oldest = if oldest.is_empty() {
            None
        } else {
            Some(
                oldest
                    .parse::<f64>()
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            )
        };

        Ok(WindowSample {
            admitted: admitted == 1,
            count,
            oldest,
        })
    }

    async fn get_bucket_state(&self, key: &str) -> Result<Option<BucketState>, StoreError> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn save_bucket_state(
        &self,
        key: &str,
        state: BucketState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string(&state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.set(key, &raw, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(self.make_key(key))
            .await
            .map_err(store_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(self.make_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(self.make_key(key)).await.map_err(store_error)?;
        Ok(removed > 0)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(self.make_key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::domain::bucket::take_token;

    async fn get_test_store() -> Option<RedisCounterStore> {
        let config = RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
            connect_timeout: Duration::from_secs(1),
            key_prefix: format!("vigil_test_{}", Uuid::new_v4()),
        };

        RedisCounterStore::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_increment_window() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => {
                tracing::warn!("Redis not available, skipping test");
                return;
            }
        };

        let ttl = Duration::from_secs(5);
        assert_eq!(store.increment_window("fw", ttl).await.unwrap(), 1);
        assert_eq!(store.increment_window("fw", ttl).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_redis_sliding_window() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };

        let window = Duration::from_secs(60);
        assert!(store.add_timestamp_trim("sw", 0.0, window, 2).await.unwrap().admitted);
        assert!(store.add_timestamp_trim("sw", 1.0, window, 2).await.unwrap().admitted);

        let rejected = store.add_timestamp_trim("sw", 2.0, window, 2).await.unwrap();
        assert!(!rejected.admitted);
        assert_eq!(rejected.oldest, Some(0.0));

        let later = store.add_timestamp_trim("sw", 61.0, window, 2).await.unwrap();
        assert!(later.admitted);
        assert_eq!(later.oldest, Some(1.0));
    }

    #[tokio::test]
    async fn test_redis_bucket_round_trip() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };

        let ttl = Duration::from_secs(5);
        let step = store
            .update_bucket("tb", ttl, &|prev| take_token(prev, 10.0, 1.0, 2.0, 2.0))
            .await
            .unwrap();
        assert!(step.allowed);
        let saved = store.get_bucket_state("tb").await.unwrap().unwrap();
        assert_eq!(saved.tokens, 1.0);
    }

    #[tokio::test]
    async fn test_redis_take_is_one_shot() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };

        store.set("csrf", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.take("csrf").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.take("csrf").await.unwrap(), None);
    }
}
