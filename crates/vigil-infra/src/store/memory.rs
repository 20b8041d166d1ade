//! In-memory counter store - used when no distributed backend is configured.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;

use vigil_core::domain::window::sliding_cutoff;
use vigil_core::domain::{BucketState, BucketStep, WindowSample};
use vigil_core::ports::{BucketUpdate, Clock, CounterStore, StoreError, SystemClock};

enum Slot {
    Counter(u64),
    Timestamps(VecDeque<f64>),
    Bucket(BucketState),
    Value(String),
}

struct Entry {
    slot: Slot,
    expires_at: Option<f64>,
}

impl Entry {
    fn new(slot: Slot, now: f64, ttl: Duration) -> Self {
        Self {
            slot,
            expires_at: Some(now + ttl.as_secs_f64()),
        }
    }

    fn is_expired(&self, now: f64) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// In-memory counter store on a sharded `DashMap`.
///
/// Each operation runs under the write lock of the key's shard, so it is
/// linearizable per key while unrelated keys proceed in parallel.
/// Note: state is per-process and lost on restart.
pub struct InMemoryCounterStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Expiry is evaluated against `clock`; share it with the limiter.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lock `key`, replacing a missing or expired entry with `fresh()`.
    fn live_entry(
        &self,
        key: &str,
        now: f64,
        fresh: impl FnOnce() -> Entry,
    ) -> RefMut<'_, String, Entry> {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Value(String::new()),
            expires_at: Some(f64::NEG_INFINITY),
        });
        if entry.is_expired(now) {
            *entry = fresh();
        }
        entry
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entry = self.live_entry(key, now, || Entry::new(Slot::Counter(0), now, ttl));

        match &mut entry.slot {
            Slot::Counter(count) => {
                *count += 1;
                Ok(*count)
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn add_timestamp_trim(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowSample, StoreError> {
        let store_now = self.clock.now();
        let mut entry = self.live_entry(key, store_now, || {
            Entry::new(Slot::Timestamps(VecDeque::new()), store_now, window)
        });
        let entry = &mut *entry;

        let Slot::Timestamps(log) = &mut entry.slot else {
            return Err(Self::wrong_type(key));
        };

        let cutoff = sliding_cutoff(now, window);
        while log.front().is_some_and(|t| *t <= cutoff) {
            log.pop_front();
        }

        let admitted = (log.len() as u64) < limit;
        if admitted {
            // Concurrent callers may arrive slightly out of order.
            let at = log.partition_point(|t| *t <= now);
            log.insert(at, now);
            entry.expires_at = Some(store_now + window.as_secs_f64());
        }

        Ok(WindowSample {
            admitted,
            count: log.len() as u64,
            oldest: log.front().copied(),
        })
    }

    async fn get_bucket_state(&self, key: &str) -> Result<Option<BucketState>, StoreError> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.slot {
                Slot::Bucket(state) => Ok(Some(*state)),
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn save_bucket_state(
        &self,
        key: &str,
        state: BucketState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.entries
            .insert(key.to_string(), Entry::new(Slot::Bucket(state), now, ttl));
        Ok(())
    }

    async fn update_bucket(
        &self,
        key: &str,
        ttl: Duration,
        update: BucketUpdate<'_>,
    ) -> Result<BucketStep, StoreError> {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Value(String::new()),
            expires_at: Some(f64::NEG_INFINITY),
        });

        let current = if entry.is_expired(now) {
            None
        } else {
            match &entry.slot {
                Slot::Bucket(state) => Some(*state),
                _ => return Err(Self::wrong_type(key)),
            }
        };

        let step = update(current);
        *entry = Entry::new(Slot::Bucket(step.state), now, ttl);
        Ok(step)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        {
            let Some(entry) = self.entries.get(key) else {
                return Ok(None);
            };
            if !entry.is_expired(now) {
                return match &entry.slot {
                    Slot::Value(value) => Ok(Some(value.clone())),
                    _ => Err(Self::wrong_type(key)),
                };
            }
        }
        // Clean up expired entry; the read guard is released above.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.entries.insert(
            key.to_string(),
            Entry::new(Slot::Value(value.to_string()), now, ttl),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let removed = self
            .entries
            .remove_if(key, |_, entry| matches!(entry.slot, Slot::Value(_)));

        Ok(match removed {
            Some((_, entry)) if !entry.is_expired(now) => match entry.slot {
                Slot::Value(value) => Some(value),
                _ => None,
            },
            _ => None,
        })
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}
