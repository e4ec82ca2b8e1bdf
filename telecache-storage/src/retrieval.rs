//! Read path: cache first, durable store on miss, then repopulate.

use std::sync::Arc;

use telecache_core::{decode_record, encode_record, ListingError, RetrievalError, TelemetryRecord};
use tracing::{debug, error, warn};

use crate::config::CoordinatorConfig;
use crate::deadline::{read_with_retry, with_cache_deadline};
use crate::stats::CoordinatorStats;
use crate::traits::{SharedDurableStore, SharedFastCache};

/// Which store answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPath {
    Cache,
    Store,
}

/// Result of a per-device read.
///
/// `envelope` is the cache envelope for `record`: the cached bytes verbatim
/// on a hit, or the canonical encoding of the durable row on a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub record: TelemetryRecord,
    pub source: ReadPath,
    pub envelope: Vec<u8>,
}

impl Retrieval {
    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadPath::Cache
    }
}

/// Serves the latest reading per device.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    store: SharedDurableStore,
    cache: SharedFastCache,
    config: CoordinatorConfig,
    stats: Arc<CoordinatorStats>,
}

impl RetrievalCoordinator {
    pub fn new(store: SharedDurableStore, cache: SharedFastCache, config: CoordinatorConfig) -> Self {
        Self {
            store,
            cache,
            config,
            stats: Arc::new(CoordinatorStats::new()),
        }
    }

    /// Share a stats handle with other coordinators.
    pub fn with_stats(mut self, stats: Arc<CoordinatorStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<CoordinatorStats> {
        &self.stats
    }

    /// Latest record for a device.
    ///
    /// Any cache fault degrades to a miss. Only durable store faults, an
    /// undecodable durable row, or an unknown device reach the caller.
    pub async fn retrieve(&self, device_id: &str) -> Result<Retrieval, RetrievalError> {
        if device_id.trim().is_empty() {
            return Err(RetrievalError::NotFound {
                device_id: device_id.to_string(),
            });
        }

        if let Some(hit) = self.read_cache(device_id).await {
            return Ok(hit);
        }
        self.stats.record_miss();
        self.stats.record_store_fallback();

        let row = read_with_retry("latest", self.config.call_timeout, || {
            self.store.latest(device_id)
        })
        .await
        .map_err(|e| {
            error!(device_id, error = %e, "durable read failed");
            RetrievalError::StorageUnavailable(e)
        })?
        .ok_or_else(|| RetrievalError::NotFound {
            device_id: device_id.to_string(),
        })?;

        let record = TelemetryRecord::from_row(row).map_err(|source| {
            error!(device_id, error = %source, "durable row is undecodable");
            RetrievalError::Decode {
                device_id: device_id.to_string(),
                source,
            }
        })?;
        let envelope = encode_record(&record).map_err(|source| RetrievalError::Decode {
            device_id: device_id.to_string(),
            source,
        })?;

        self.repopulate(device_id, record.timestamp, &envelope).await;

        Ok(Retrieval {
            record,
            source: ReadPath::Store,
            envelope,
        })
    }

    /// Every decodable cached record, ordered by device id.
    ///
    /// The cache is the only source for this view, so failing to enumerate
    /// keys is an error. Individual unreadable or corrupt entries are skipped.
    pub async fn list_cached(&self) -> Result<Vec<TelemetryRecord>, ListingError> {
        let mut keys = with_cache_deadline("keys", self.config.call_timeout, self.cache.keys())
            .await
            .map_err(|e| {
                warn!(error = %e, "cache key enumeration failed");
                ListingError::CacheUnavailable(e)
            })?;
        keys.sort();
        keys.dedup();

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let read =
                with_cache_deadline("get", self.config.call_timeout, self.cache.get(&key)).await;
            let bytes = match read {
                Ok(Some(bytes)) => bytes,
                // Expired between enumeration and read.
                Ok(None) => continue,
                Err(e) => {
                    self.stats.record_cache_read_failure();
                    warn!(key = %key, error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            match decode_record(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.stats.record_corrupt_entry();
                    warn!(key = %key, error = %e, "skipping undecodable cache entry");
                }
            }
        }
        records.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(records)
    }

    /// Up to `limit` durable records for a device, newest first. Never cached.
    ///
    /// `limit` is clamped into `1..=max_history`; `None` means the maximum.
    pub async fn history(
        &self,
        device_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetryRecord>, RetrievalError> {
        if device_id.trim().is_empty() {
            return Err(RetrievalError::NotFound {
                device_id: device_id.to_string(),
            });
        }
        let limit = self.config.clamp_history(limit);

        let rows = read_with_retry("history", self.config.call_timeout, || {
            self.store.history(device_id, limit)
        })
        .await
        .map_err(|e| {
            error!(device_id, error = %e, "durable history read failed");
            RetrievalError::StorageUnavailable(e)
        })?;

        if rows.is_empty() {
            return Err(RetrievalError::NotFound {
                device_id: device_id.to_string(),
            });
        }

        rows.into_iter()
            .map(|row| {
                TelemetryRecord::from_row(row).map_err(|source| RetrievalError::Decode {
                    device_id: device_id.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Cache lookup. `None` means "go to the durable store".
    async fn read_cache(&self, device_id: &str) -> Option<Retrieval> {
        let read =
            with_cache_deadline("get", self.config.call_timeout, self.cache.get(device_id)).await;
        let bytes = match read {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                self.stats.record_cache_read_failure();
                warn!(device_id, error = %e, "cache read failed, falling back to durable store");
                return None;
            }
        };

        match decode_record(&bytes) {
            Ok(record) => {
                self.stats.record_hit();
                debug!(device_id, "cache hit");
                Some(Retrieval {
                    record,
                    source: ReadPath::Cache,
                    envelope: bytes,
                })
            }
            Err(e) => {
                self.stats.record_corrupt_entry();
                warn!(device_id, error = %e, "corrupt cache entry treated as miss");
                None
            }
        }
    }

    /// Write the durable answer back unless a concurrent ingest has already
    /// cached a record at least as new.
    async fn repopulate(&self, device_id: &str, timestamp: i64, envelope: &[u8]) {
        let current =
            with_cache_deadline("get", self.config.call_timeout, self.cache.get(device_id)).await;
        if let Ok(Some(bytes)) = current {
            if let Ok(cached) = decode_record(&bytes) {
                if cached.timestamp >= timestamp {
                    debug!(
                        device_id,
                        cached_timestamp = cached.timestamp,
                        fetched_timestamp = timestamp,
                        "newer entry already cached, skipping repopulation"
                    );
                    return;
                }
            }
        }

        match with_cache_deadline(
            "set",
            self.config.call_timeout,
            self.cache.set(device_id, envelope, self.config.cache_ttl),
        )
        .await
        {
            Ok(()) => {
                self.stats.record_repopulation();
                debug!(device_id, "cache repopulated from durable store");
            }
            Err(e) => {
                self.stats.record_cache_write_failure();
                warn!(device_id, error = %e, "cache repopulation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDurableStore, InMemoryFastCache};
    use crate::traits::DurableStore;
    use serde_json::json;
    use std::time::Duration;
    use telecache_core::{Payload, StoreError, TelemetryRow};

    fn record(device_id: &str, timestamp: i64, temp: f64) -> TelemetryRecord {
        TelemetryRecord::new(
            device_id,
            "sensor",
            timestamp,
            Payload::try_from(json!({"temp": temp})).unwrap(),
        )
    }

    fn setup_with(
        config: CoordinatorConfig,
    ) -> (Arc<InMemoryDurableStore>, Arc<InMemoryFastCache>, RetrievalCoordinator) {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        let coordinator = RetrievalCoordinator::new(store.clone(), cache.clone(), config);
        (store, cache, coordinator)
    }

    fn setup() -> (Arc<InMemoryDurableStore>, Arc<InMemoryFastCache>, RetrievalCoordinator) {
        setup_with(CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn test_hit_skips_durable_store() {
        let (store, cache, coordinator) = setup();
        let envelope = encode_record(&record("d1", 10, 1.5)).unwrap();
        cache.plant("d1", &envelope, Duration::from_secs(60)).unwrap();

        let hit = coordinator.retrieve("d1").await.unwrap();
        assert!(hit.was_cache_hit());
        assert_eq!(hit.envelope, envelope);
        assert_eq!(store.read_calls(), 0);
        assert_eq!(coordinator.stats().snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_miss_falls_back_and_repopulates() {
        let (store, cache, coordinator) = setup();
        store.seed(record("d1", 10, 1.5).to_row().unwrap()).unwrap();

        let first = coordinator.retrieve("d1").await.unwrap();
        assert_eq!(first.source, ReadPath::Store);
        assert_eq!(cache.peek("d1"), Some(first.envelope.clone()));

        let second = coordinator.retrieve("d1").await.unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(second.envelope, first.envelope);
        assert_eq!(store.read_calls(), 1);

        let snap = coordinator.stats().snapshot();
        assert_eq!(snap.repopulations, 1);
        assert_eq!(snap.store_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_fallback_returns_latest_by_timestamp() {
        let (store, _cache, coordinator) = setup();
        store.seed(record("d1", 300, 3.0).to_row().unwrap()).unwrap();
        store.seed(record("d1", 100, 1.0).to_row().unwrap()).unwrap();

        let got = coordinator.retrieve("d1").await.unwrap();
        assert_eq!(got.record.timestamp, 300);
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let (store, _cache, coordinator) = setup();
        let err = coordinator.retrieve("ghost").await.unwrap_err();
        assert!(matches!(err, RetrievalError::NotFound { ref device_id } if device_id == "ghost"));
        assert_eq!(store.read_calls(), 1);
    }

    #[tokio::test]
    async fn test_blank_device_id_touches_nothing() {
        let (store, cache, coordinator) = setup();
        let err = coordinator.retrieve("").await.unwrap_err();
        assert!(matches!(err, RetrievalError::NotFound { .. }));
        assert_eq!(store.read_calls(), 0);
        assert_eq!(cache.set_calls(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (store, cache, coordinator) = setup();
        store.seed(record("d1", 10, 1.5).to_row().unwrap()).unwrap();
        cache.plant("d1", b"\xffnot an envelope", Duration::from_secs(60)).unwrap();

        let got = coordinator.retrieve("d1").await.unwrap();
        assert_eq!(got.source, ReadPath::Store);
        assert_eq!(got.record, record("d1", 10, 1.5));
        // Overwritten with a good envelope.
        assert_eq!(cache.peek("d1"), Some(got.envelope));
        assert_eq!(coordinator.stats().snapshot().corrupt_entries, 1);
    }

    #[tokio::test]
    async fn test_cache_outage_is_transparent() {
        let (store, cache, coordinator) = setup();
        store.seed(record("d1", 10, 1.5).to_row().unwrap()).unwrap();
        cache.set_unavailable(true);

        let got = coordinator.retrieve("d1").await.unwrap();
        assert_eq!(got.record, record("d1", 10, 1.5));

        let snap = coordinator.stats().snapshot();
        assert_eq!(snap.cache_read_failures, 1);
        assert_eq!(snap.cache_write_failures, 1);
    }

    #[tokio::test]
    async fn test_store_outage_on_miss_is_storage_unavailable() {
        let (store, _cache, coordinator) = setup();
        store.set_unavailable(true);
        let err = coordinator.retrieve("d1").await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::StorageUnavailable(StoreError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_outage_does_not_affect_hits() {
        let (store, cache, coordinator) = setup();
        let envelope = encode_record(&record("d1", 10, 1.5)).unwrap();
        cache.plant("d1", &envelope, Duration::from_secs(60)).unwrap();
        store.set_unavailable(true);

        assert!(coordinator.retrieve("d1").await.unwrap().was_cache_hit());
    }

    #[tokio::test]
    async fn test_undecodable_durable_row_is_decode_error() {
        let (store, cache, coordinator) = setup();
        store
            .seed(TelemetryRow {
                device_id: "d1".to_string(),
                device_type: "sensor".to_string(),
                timestamp: 1,
                payload: b"[1,2,3]".to_vec(),
            })
            .unwrap();

        let err = coordinator.retrieve("d1").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Decode { .. }));
        assert_eq!(cache.set_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_falls_back() {
        let (store, cache, coordinator) =
            setup_with(CoordinatorConfig::new().with_ttl(Duration::from_secs(60)));
        let stale = encode_record(&record("d1", 5, 0.5)).unwrap();
        cache.plant("d1", &stale, Duration::from_secs(60)).unwrap();
        store.seed(record("d1", 10, 1.5).to_row().unwrap()).unwrap();

        assert!(coordinator.retrieve("d1").await.unwrap().was_cache_hit());

        tokio::time::advance(Duration::from_secs(61)).await;
        let got = coordinator.retrieve("d1").await.unwrap();
        assert_eq!(got.source, ReadPath::Store);
        assert_eq!(got.record.timestamp, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_read_is_retried_once() {
        let (store, _cache, coordinator) = setup_with(
            CoordinatorConfig::new().with_call_timeout(Duration::from_millis(100)),
        );
        store.seed(record("d1", 10, 1.5).to_row().unwrap()).unwrap();
        store.set_latency(Duration::from_secs(5));

        let err = coordinator.retrieve("d1").await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::StorageUnavailable(StoreError::Timeout { .. })
        ));
        assert_eq!(store.read_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cache_degrades_to_store() {
        let (store, cache, coordinator) = setup_with(
            CoordinatorConfig::new().with_call_timeout(Duration::from_millis(100)),
        );
        store.seed(record("d1", 10, 1.5).to_row().unwrap()).unwrap();
        cache.set_latency(Duration::from_secs(5));

        let got = coordinator.retrieve("d1").await.unwrap();
        assert_eq!(got.source, ReadPath::Store);
    }

    /// Reads the latest row immediately but answers only after `delay`.
    struct LaggingLatest {
        inner: InMemoryDurableStore,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl DurableStore for LaggingLatest {
        async fn append(&self, row: &TelemetryRow) -> Result<(), StoreError> {
            self.inner.append(row).await
        }

        async fn latest(&self, device_id: &str) -> Result<Option<TelemetryRow>, StoreError> {
            let row = self.inner.latest(device_id).await?;
            tokio::time::sleep(self.delay).await;
            Ok(row)
        }

        async fn history(
            &self,
            device_id: &str,
            limit: usize,
        ) -> Result<Vec<TelemetryRow>, StoreError> {
            self.inner.history(device_id, limit).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_keeps_newer_entry_from_concurrent_ingest() {
        let store = Arc::new(LaggingLatest {
            inner: InMemoryDurableStore::new(),
            delay: Duration::from_millis(50),
        });
        store.inner.seed(record("d1", 1, 1.0).to_row().unwrap()).unwrap();
        let cache = Arc::new(InMemoryFastCache::new());
        let (ingest, retrieval) =
            crate::build_coordinators(store.clone(), cache.clone(), CoordinatorConfig::default());

        let newer = record("d1", 2, 2.0);
        let (read, written) = tokio::join!(retrieval.retrieve("d1"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ingest.ingest(newer.clone()).await
        });

        let read = read.unwrap();
        assert_eq!(read.source, ReadPath::Store);
        assert_eq!(read.record.timestamp, 1);
        assert!(written.unwrap().cached);

        let cached = decode_record(&cache.peek("d1").unwrap()).unwrap();
        assert_eq!(cached, newer);
        assert_eq!(cache.set_calls(), 1);
        assert_eq!(retrieval.stats().snapshot().repopulations, 0);
    }

    #[tokio::test]
    async fn test_list_cached_skips_bad_entries_and_sorts() {
        let (_store, cache, coordinator) = setup();
        let ttl = Duration::from_secs(60);
        for id in ["zeta", "alpha", "mid"] {
            cache
                .plant(id, &encode_record(&record(id, 1, 0.0)).unwrap(), ttl)
                .unwrap();
        }
        cache.plant("broken", b"{", ttl).unwrap();

        let listed = coordinator.list_cached().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
        assert_eq!(coordinator.stats().snapshot().corrupt_entries, 1);
    }

    #[tokio::test]
    async fn test_list_cached_fails_when_keys_unavailable() {
        let (_store, cache, coordinator) = setup();
        cache.set_unavailable(true);
        let err = coordinator.list_cached().await.unwrap_err();
        assert!(matches!(err, ListingError::CacheUnavailable(_)));
    }

    #[tokio::test]
    async fn test_list_cached_empty() {
        let (_store, _cache, coordinator) = setup();
        assert!(coordinator.list_cached().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_newest_first_and_clamped() {
        let (store, cache, coordinator) =
            setup_with(CoordinatorConfig::new().with_max_history(3));
        for ts in 1..=5 {
            store.append(&record("d1", ts, ts as f64).to_row().unwrap()).await.unwrap();
        }

        let all = coordinator.history("d1", None).await.unwrap();
        let stamps: Vec<i64> = all.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![5, 4, 3]);

        let one = coordinator.history("d1", Some(0)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(cache.set_calls(), 0);
    }

    #[tokio::test]
    async fn test_history_unknown_device_is_not_found() {
        let (_store, _cache, coordinator) = setup();
        let err = coordinator.history("ghost", Some(10)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::NotFound { .. }));
    }
}
