use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    config::CacheTtls,
    models::{LocationQuery, ResourceKind, UnitSystem},
    store::{KeyValueStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Hit,
    Fresh,
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub source: CacheSource,
}

impl<T> Cached<T> {
    pub fn from_cache(&self) -> bool {
        self.source == CacheSource::Hit
    }
}

pub fn cache_key(kind: ResourceKind, location: &LocationQuery, units: UnitSystem) -> String {
    format!("{}:{}:{}", kind.as_str(), location.cache_segment(), units.as_str())
}

/// Best-effort cache-aside over the shared store. Store failures turn reads
/// into misses and writes into no-ops; only `fetch` can fail a call.
///
/// Concurrent misses on one key each run `fetch` and each write the result;
/// the last write wins.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn KeyValueStore>,
    ttls: CacheTtls,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KeyValueStore>, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Weather => self.ttls.current,
            ResourceKind::Forecast => self.ttls.forecast,
            ResourceKind::Alerts => self.ttls.alerts,
        }
    }

    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.read(key).await {
            tracing::debug!(key = %key, "cache hit");
            return Ok(Cached {
                value,
                source: CacheSource::Hit,
            });
        }

        let value = fetch().await?;
        self.write(key, &value, ttl).await;

        Ok(Cached {
            value,
            source: CacheSource::Fresh,
        })
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                log_store_error(&err, key, "cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "cached payload undecodable; treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to serialize cache payload");
                return;
            }
        };

        if let Err(err) = self.store.set(key, payload, ttl).await {
            log_store_error(&err, key, "cache write failed; continuing without cache");
        }
    }
}

fn log_store_error(err: &StoreError, key: &str, message: &str) {
    if err.is_disabled() {
        tracing::debug!(key = %key, "{message}");
    } else {
        tracing::warn!(key = %key, error = %err, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{store::memory::MemoryStore, testing::FailingStore};

    fn layer(store: Arc<dyn KeyValueStore>) -> CacheLayer {
        CacheLayer::new(store, CacheTtls::default())
    }

    async fn counted_fetch(calls: &AtomicUsize, value: u32) -> Result<u32, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache = layer(Arc::new(MemoryStore::new()));
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        let first = cache
            .get_or_fetch("weather:lima:metric", ttl, || counted_fetch(&calls, 7))
            .await
            .unwrap();
        let second = cache
            .get_or_fetch("weather:lima:metric", ttl, || counted_fetch(&calls, 8))
            .await
            .unwrap();

        assert_eq!(first.source, CacheSource::Fresh);
        assert_eq!(second.source, CacheSource::Hit);
        assert_eq!(second.value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_fetched_again() {
        let cache = layer(Arc::new(MemoryStore::new()));
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        cache
            .get_or_fetch("forecast:lima:metric", ttl, || counted_fetch(&calls, 1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let again = cache
            .get_or_fetch("forecast:lima:metric", ttl, || counted_fetch(&calls, 2))
            .await
            .unwrap();

        assert_eq!(again.source, CacheSource::Fresh);
        assert_eq!(again.value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn store_failure_degrades_to_passthrough() {
        let cache = layer(Arc::new(FailingStore));
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        for _ in 0..3 {
            let result = cache
                .get_or_fetch("weather:lima:metric", ttl, || counted_fetch(&calls, 3))
                .await
                .unwrap();
            assert_eq!(result.source, CacheSource::Fresh);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn corrupt_entry_is_treated_as_miss_and_overwritten() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("weather:lima:metric", Bytes::from_static(b"{not json"), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = layer(store.clone());
        let calls = AtomicUsize::new(0);

        let result = cache
            .get_or_fetch("weather:lima:metric", Duration::from_secs(60), || {
                counted_fetch(&calls, 5)
            })
            .await
            .unwrap();

        assert_eq!(result.source, CacheSource::Fresh);
        assert_eq!(
            store.get("weather:lima:metric").await.unwrap(),
            Some(Bytes::from_static(b"5"))
        );
    }

    #[tokio::test]
    async fn fetch_errors_are_returned_and_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let cache = layer(store.clone());

        let result: Result<Cached<u32>, String> = cache
            .get_or_fetch("weather:nowhere:metric", Duration::from_secs(60), || async {
                Err("not found".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "not found");
        assert_eq!(store.get("weather:nowhere:metric").await.unwrap(), None);
    }

    #[test]
    fn keys_are_case_insensitive_and_unit_sensitive() {
        let lima = LocationQuery::city("Lima").unwrap();
        let lower = LocationQuery::city("lima").unwrap();

        let metric = cache_key(ResourceKind::Weather, &lima, UnitSystem::Metric);
        assert_eq!(metric, "weather:lima:metric");
        assert_eq!(metric, cache_key(ResourceKind::Weather, &lower, UnitSystem::Metric));
        assert_ne!(metric, cache_key(ResourceKind::Weather, &lima, UnitSystem::Imperial));
    }

    #[test]
    fn nearby_coordinates_share_a_key() {
        let a = LocationQuery::coordinates(51.5074, -0.1278).unwrap();
        let b = LocationQuery::coordinates(51.5112, -0.1334).unwrap();

        assert_eq!(
            cache_key(ResourceKind::Forecast, &a, UnitSystem::Metric),
            "forecast:coords:51.51:-0.13:metric"
        );
        assert_eq!(
            cache_key(ResourceKind::Forecast, &a, UnitSystem::Metric),
            cache_key(ResourceKind::Forecast, &b, UnitSystem::Metric)
        );
    }

    #[test]
    fn ttl_policy_per_resource() {
        let cache = layer(Arc::new(MemoryStore::new()));
        assert_eq!(cache.ttl_for(ResourceKind::Weather), Duration::from_secs(900));
        assert_eq!(cache.ttl_for(ResourceKind::Forecast), Duration::from_secs(3600));
        assert_eq!(cache.ttl_for(ResourceKind::Alerts), Duration::from_secs(600));
    }
}
