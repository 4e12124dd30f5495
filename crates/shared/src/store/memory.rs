//! In-process [`SharedStore`].
//!
//! Every operation runs under one short critical section, which is what makes
//! `incr_with_expiry` atomic for concurrent callers. Expired entries are
//! ignored on read and removed lazily or by [`MemoryStore::sweep_expired`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::{SharedStore, StoreError};
use crate::clock::{Clock, SystemClock};

#[derive(Debug)]
enum Slot {
    Counter(u64),
    Text(String),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    /// `None` when the TTL does not fit in a timestamp.
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

/// Volatile store backed by a mutex-guarded map.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Lock the entries mutex, recovering from poison if necessary.
    ///
    /// Every mutation completes before the guard drops, so a poisoned map is
    /// still consistent.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Remove expired entries and return how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Memory store: swept {} expired entries", removed);
        }
        removed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock_entries()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();

        let live = entries.get(key).is_some_and(|entry| entry.is_live(now));
        if !live {
            entries.insert(
                key.to_string(),
                Entry {
                    slot: Slot::Counter(1),
                    expires_at: expiry(now, ttl),
                },
            );
            return Ok(1);
        }

        match entries.get_mut(key).map(|entry| &mut entry.slot) {
            Some(Slot::Counter(count)) => {
                *count = count.saturating_add(1);
                Ok(*count)
            }
            _ => Err(StoreError::NotACounter(key.to_string())),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();

        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get(key).map(|entry| match &entry.slot {
            Slot::Counter(count) => count.to_string(),
            Slot::Text(text) => text.clone(),
        }))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.lock_entries().insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value),
                expires_at: expiry(now, ttl),
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn manual_store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let store = MemoryStore::with_clock(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn test_incr_starts_at_one_and_counts_up() {
        let (_clock, store) = manual_store();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr_with_expiry("k", ttl).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("k", ttl).await.unwrap(), 2);
        assert_eq!(store.incr_with_expiry("k", ttl).await.unwrap(), 3);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_incr_keeps_first_expiry() {
        let (clock, store) = manual_store();
        let ttl = Duration::from_secs(60);
        store.incr_with_expiry("k", ttl).await.unwrap();
        clock.advance(Duration::from_secs(59));
        assert_eq!(store.incr_with_expiry("k", ttl).await.unwrap(), 2);

        // Expiry was not pushed back by the second increment.
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.incr_with_expiry("k", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_value_expires_after_ttl() {
        let (clock, store) = manual_store();
        store
            .set_with_expiry("k", "v".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(9));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_value() {
        let (_clock, store) = manual_store();
        let ttl = Duration::from_secs(10);
        store.set_with_expiry("k", "a".to_string(), ttl).await.unwrap();
        store.set_with_expiry("k", "b".to_string(), ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_incr_on_text_is_rejected() {
        let (_clock, store) = manual_store();
        store
            .set_with_expiry("k", "text".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        let err = store
            .incr_with_expiry("k", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotACounter("k".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (clock, store) = manual_store();
        store
            .set_with_expiry("short", "a".to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        store
            .set_with_expiry("long", "b".to_string(), Duration::from_secs(50))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .incr_with_expiry("hot", Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
    }
}
