//! Read-through response cache.
//!
//! Two keys per entry, both written with the same TTL:
//!
//! - `query:{fingerprint}` holds the request id of the latest result
//! - `result:{request_id}` holds the serialized [`CachedInsight`]
//!
//! With `partition_by_identity` both keys carry the caller identity
//! (`query:{identity}|...`, `result:{identity}:{request_id}`), so one caller
//! can neither hit nor look up another caller's entries.
//!
//! The result is written before the pointer, so a reader that finds a pointer
//! also finds its payload unless it expired in between. Store problems never
//! fail a request: reads degrade to a miss and writes are skipped.

use std::sync::Arc;
use std::time::Duration;

use insights_shared::{CachedInsight, CryptoInsight, Identity, SharedStore, StoreError, Symbol};
use tracing::{debug, warn};

/// Cache settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Keep a separate cache per caller identity
    pub partition_by_identity: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            partition_by_identity: false,
        }
    }
}

/// Normalized request fingerprint: case-folded, trimmed, key-sorted
/// `k=v` pairs joined by `&`, prefixed with the identity when partitioned.
pub fn fingerprint(params: &[(&str, &str)], identity: Option<&Identity>) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
        .collect();
    pairs.sort();

    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    match identity {
        Some(identity) => format!("{identity}|{joined}"),
        None => joined,
    }
}

fn query_key(fingerprint: &str) -> String {
    format!("query:{fingerprint}")
}

fn result_key(request_id: &str, partition: Option<&Identity>) -> String {
    match partition {
        Some(identity) => format!("result:{identity}:{request_id}"),
        None => format!("result:{request_id}"),
    }
}

pub struct ResponseCache {
    store: Arc<dyn SharedStore>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn SharedStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    fn partition<'a>(&self, identity: &'a Identity) -> Option<&'a Identity> {
        self.config.partition_by_identity.then_some(identity)
    }

    /// Fingerprint for a symbol lookup by `identity`.
    pub fn fingerprint_for(&self, symbol: &Symbol, identity: &Identity) -> String {
        fingerprint(&[("symbol", symbol.slug())], self.partition(identity))
    }

    /// Look up a live entry for `fingerprint` on behalf of `identity`.
    pub async fn get(&self, fingerprint: &str, identity: &Identity) -> Option<CachedInsight> {
        let request_id = match self.store.get(&query_key(fingerprint)).await {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", fingerprint, e);
                return None;
            }
        };
        self.get_by_request_id(&request_id, identity).await
    }

    /// Read a stored result directly by the request id handed to the client.
    /// When partitioned, only the identity that stored it can read it.
    pub async fn get_by_request_id(
        &self,
        request_id: &str,
        identity: &Identity,
    ) -> Option<CachedInsight> {
        let key = result_key(request_id, self.partition(identity));
        let payload = match self.store.get(&key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for request {}: {}", request_id, e);
                return None;
            }
        };

        match serde_json::from_str::<CachedInsight>(&payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", request_id, e);
                None
            }
        }
    }

    /// Store a fresh result under `fingerprint`.
    ///
    /// Failures are logged and swallowed.
    pub async fn put(
        &self,
        fingerprint: &str,
        identity: &Identity,
        request_id: &str,
        data: &CryptoInsight,
    ) {
        let entry = CachedInsight {
            request_id: request_id.to_string(),
            data: data.clone(),
            fetched_at: data.fetched_at,
        };

        if let Err(e) = self.write(fingerprint, identity, &entry).await {
            warn!("Skipping cache write for {}: {}", fingerprint, e);
            return;
        }
        debug!("Cached {} as request {}", fingerprint, request_id);
    }

    async fn write(
        &self,
        fingerprint: &str,
        identity: &Identity,
        entry: &CachedInsight,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(entry)
            .map_err(|e| StoreError::Unavailable(format!("failed to encode entry: {e}")))?;

        self.store
            .set_with_expiry(
                &result_key(&entry.request_id, self.partition(identity)),
                payload,
                self.config.ttl,
            )
            .await?;
        self.store
            .set_with_expiry(&query_key(fingerprint), entry.request_id.clone(), self.config.ttl)
            .await
    }

    /// Whether the backing store answers.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use insights_shared::{ManualClock, MemoryStore, SymbolValidator};
    use rust_decimal_macros::dec;

    struct DownStore;

    #[async_trait]
    impl SharedStore for DownStore {
        async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn set_with_expiry(
            &self,
            _key: &str,
            _value: String,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    fn insight() -> CryptoInsight {
        CryptoInsight {
            symbol: "bitcoin".to_string(),
            name: "Bitcoin".to_string(),
            category: Some("coin".to_string()),
            description: None,
            date_launched: None,
            logo: None,
            platform: None,
            circulating_supply: dec!(19500000),
            market_cap: dec!(1170000000000),
            price: Some(dec!(60000)),
            fetched_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn caller() -> Identity {
        Identity::new("abcd")
    }

    fn cache_with_clock() -> (Arc<ManualClock>, Arc<MemoryStore>, ResponseCache) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let cache = ResponseCache::new(store.clone(), CacheConfig::default());
        (clock, store, cache)
    }

    #[test]
    fn test_fingerprint_is_normalized_and_sorted() {
        let a = fingerprint(&[("Symbol", " BitCoin "), ("currency", "USD")], None);
        let b = fingerprint(&[("currency", "usd"), ("symbol", "bitcoin")], None);
        assert_eq!(a, b);
        assert_eq!(a, "currency=usd&symbol=bitcoin");

        let identity = Identity::new("abcd");
        assert_eq!(
            fingerprint(&[("symbol", "bitcoin")], Some(&identity)),
            "abcd|symbol=bitcoin"
        );
    }

    #[test]
    fn test_fingerprint_partitioning_follows_config() {
        let store = Arc::new(MemoryStore::new());
        let symbol = SymbolValidator::new().validate("btc").unwrap();
        let identity = Identity::new("abcd");

        let shared = ResponseCache::new(store.clone(), CacheConfig::default());
        assert_eq!(shared.fingerprint_for(&symbol, &identity), "symbol=bitcoin");

        let partitioned = ResponseCache::new(
            store,
            CacheConfig {
                partition_by_identity: true,
                ..CacheConfig::default()
            },
        );
        assert_eq!(
            partitioned.fingerprint_for(&symbol, &identity),
            "abcd|symbol=bitcoin"
        );
    }

    #[tokio::test]
    async fn test_hit_returns_entry_verbatim_until_ttl() {
        let (clock, _store, cache) = cache_with_clock();
        cache.put("symbol=bitcoin", &caller(), "req-1", &insight()).await;

        clock.advance(Duration::from_secs(599));
        let entry = cache.get("symbol=bitcoin", &caller()).await.unwrap();
        assert_eq!(entry.request_id, "req-1");
        assert_eq!(entry.data, insight());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("symbol=bitcoin", &caller()).await.is_none());
        assert!(cache.get_by_request_id("req-1", &caller()).await.is_none());
    }

    #[tokio::test]
    async fn test_later_write_overwrites_pointer() {
        let (_clock, _store, cache) = cache_with_clock();
        cache.put("symbol=bitcoin", &caller(), "req-1", &insight()).await;
        cache.put("symbol=bitcoin", &caller(), "req-2", &insight()).await;

        assert_eq!(
            cache.get("symbol=bitcoin", &caller()).await.unwrap().request_id,
            "req-2"
        );
        // The older result stays addressable by id until it expires.
        assert!(cache.get_by_request_id("req-1", &caller()).await.is_some());
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let (_clock, store, cache) = cache_with_clock();
        let ttl = Duration::from_secs(60);
        store.set_with_expiry("query:symbol=bitcoin", "req-x".to_string(), ttl).await.unwrap();
        store.set_with_expiry("result:req-x", "{not json".to_string(), ttl).await.unwrap();

        assert!(cache.get("symbol=bitcoin", &caller()).await.is_none());
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_miss_and_skip() {
        let cache = ResponseCache::new(Arc::new(DownStore), CacheConfig::default());
        cache.put("symbol=bitcoin", &caller(), "req-1", &insight()).await;
        assert!(cache.get("symbol=bitcoin", &caller()).await.is_none());
        assert!(cache.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_partitioned_request_ids_are_private_to_their_identity() {
        let store = Arc::new(MemoryStore::new());
        let owner = Identity::new("owner");
        let other = Identity::new("other");
        let symbol = SymbolValidator::new().validate("bitcoin").unwrap();

        let partitioned = ResponseCache::new(
            store.clone(),
            CacheConfig {
                partition_by_identity: true,
                ..CacheConfig::default()
            },
        );
        let fp = partitioned.fingerprint_for(&symbol, &owner);
        partitioned.put(&fp, &owner, "req-1", &insight()).await;

        assert!(partitioned.get_by_request_id("req-1", &owner).await.is_some());
        assert!(partitioned.get_by_request_id("req-1", &other).await.is_none());
        assert!(store.get("result:owner:req-1").await.unwrap().is_some());
        assert!(store.get("result:req-1").await.unwrap().is_none());

        let shared = ResponseCache::new(Arc::new(MemoryStore::new()), CacheConfig::default());
        let fp = shared.fingerprint_for(&symbol, &owner);
        shared.put(&fp, &owner, "req-2", &insight()).await;
        assert!(shared.get_by_request_id("req-2", &other).await.is_some());
    }
}
