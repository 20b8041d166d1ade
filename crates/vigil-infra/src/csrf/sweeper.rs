//! Background expiry sweep for stores without native TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use vigil_core::ports::CsrfTokenStore;

/// Run `sweep()` every `interval` until the returned handle is aborted.
pub fn spawn_sweeper(store: Arc<dyn CsrfTokenStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "CSRF sweeper started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.sweep().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Swept expired CSRF tokens"),
                Err(e) => tracing::warn!(error = %e, "CSRF sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::{CsrfConfig, StoreCsrfTokens};
    use crate::store::InMemoryCounterStore;
    use vigil_core::ports::{CounterStore, ManualClock};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_on_interval() {
        let clock = Arc::new(ManualClock::at(0.0));
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let config = CsrfConfig {
            token_ttl: Duration::from_secs(10),
            ..CsrfConfig::default()
        };
        let tokens = Arc::new(
            StoreCsrfTokens::new(store.clone(), config).with_clock(clock.clone()),
        );

        tokens.issue("a").await.unwrap();
        tokens.issue("b").await.unwrap();
        store.set("other", "v", Duration::from_secs(1_000)).await.unwrap();
        clock.set(10.0);

        let handle = spawn_sweeper(tokens, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(store.len(), 1);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_interval_drives_sweep() {
        let clock = Arc::new(ManualClock::at(0.0));
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let config = CsrfConfig {
            token_ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
            ..CsrfConfig::default()
        };
        let tokens = Arc::new(
            StoreCsrfTokens::new(store.clone(), config).with_clock(clock.clone()),
        );

        tokens.issue("a").await.unwrap();
        clock.set(10.0);

        let handle = tokens.spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.len(), 0);
        handle.abort();
    }
}
