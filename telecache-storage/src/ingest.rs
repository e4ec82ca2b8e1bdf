//! Write path: durable store first, cache second.

use std::sync::Arc;

use telecache_core::{encode_record, IngestError, TelemetryRecord, ValidationError};
use tracing::{debug, error, warn};

use crate::config::CoordinatorConfig;
use crate::deadline::{with_cache_deadline, with_store_deadline};
use crate::stats::CoordinatorStats;
use crate::traits::{SharedDurableStore, SharedFastCache};

/// Acknowledgement of a durably written record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestAck {
    pub device_id: String,
    pub timestamp: i64,
    /// Whether the cache write landed. Informational only.
    pub cached: bool,
}

/// Accepts new telemetry, persists it, then mirrors it into the cache.
///
/// The durable write decides the outcome. A cache failure after a successful
/// durable write is logged and counted but never fails the call, and the row
/// is never rolled back.
#[derive(Clone)]
pub struct IngestCoordinator {
    store: SharedDurableStore,
    cache: SharedFastCache,
    config: CoordinatorConfig,
    stats: Arc<CoordinatorStats>,
}

impl IngestCoordinator {
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

    /// Persist a record and populate the cache.
    pub async fn ingest(&self, record: TelemetryRecord) -> Result<IngestAck, IngestError> {
        record.validate()?;

        let row = record.to_row().map_err(|e| ValidationError::MalformedBody {
            reason: e.to_string(),
        })?;
        let envelope = encode_record(&record).map_err(|e| ValidationError::MalformedBody {
            reason: e.to_string(),
        })?;

        // Append is not idempotent, so no retry here.
        if let Err(e) =
            with_store_deadline("append", self.config.call_timeout, self.store.append(&row)).await
        {
            error!(device_id = %record.device_id, error = %e, "durable append failed");
            return Err(IngestError::PersistenceFailed(e));
        }
        self.stats.record_ingest();

        let cached = match with_cache_deadline(
            "set",
            self.config.call_timeout,
            self.cache
                .set(&record.device_id, &envelope, self.config.cache_ttl),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                self.stats.record_cache_write_failure();
                warn!(device_id = %record.device_id, error = %e, "cache write after ingest failed");
                false
            }
        };

        debug!(
            device_id = %record.device_id,
            timestamp = record.timestamp,
            cached,
            "telemetry ingested"
        );

        Ok(IngestAck {
            device_id: record.device_id,
            timestamp: record.timestamp,
            cached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDurableStore, InMemoryFastCache};
    use crate::traits::DurableStore;
    use serde_json::json;
    use std::time::Duration;
    use telecache_core::{decode_record, Payload, StoreError};

    fn record(device_id: &str, timestamp: i64) -> TelemetryRecord {
        TelemetryRecord::new(
            device_id,
            "sensor",
            timestamp,
            Payload::try_from(json!({"temp": 21.5, "tags": ["a", "b"]})).unwrap(),
        )
    }

    fn setup() -> (Arc<InMemoryDurableStore>, Arc<InMemoryFastCache>, IngestCoordinator) {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        let coordinator =
            IngestCoordinator::new(store.clone(), cache.clone(), CoordinatorConfig::default());
        (store, cache, coordinator)
    }

    #[tokio::test]
    async fn test_ingest_writes_store_then_cache() {
        let (store, cache, coordinator) = setup();
        let ack = coordinator.ingest(record("d1", 1000)).await.unwrap();

        assert!(ack.cached);
        assert_eq!(ack.device_id, "d1");
        assert_eq!(store.row_count(), 1);
        let cached = decode_record(&cache.peek("d1").unwrap()).unwrap();
        assert_eq!(cached, record("d1", 1000));
        assert_eq!(coordinator.stats().snapshot().ingested, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_sets_configured_ttl() {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        let coordinator = IngestCoordinator::new(
            store,
            cache.clone(),
            CoordinatorConfig::new().with_ttl(Duration::from_secs(30)),
        );
        coordinator.ingest(record("d1", 1)).await.unwrap();
        let remaining = cache.ttl_remaining("d1").unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
    }

    #[tokio::test]
    async fn test_blank_device_id_touches_nothing() {
        let (store, cache, coordinator) = setup();
        let err = coordinator.ingest(record("  ", 1)).await.unwrap_err();

        assert!(matches!(err, IngestError::Validation(_)));
        assert_eq!(store.append_calls(), 0);
        assert_eq!(cache.set_calls(), 0);
    }

    #[tokio::test]
    async fn test_nul_in_payload_is_rejected_before_the_store() {
        let (store, cache, coordinator) = setup();
        let record = TelemetryRecord::new(
            "d1",
            "sensor",
            1,
            Payload::try_from(json!({"k": "a\u{0}b"})).unwrap(),
        );

        let err = coordinator.ingest(record).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::InvalidValue { .. })
        ));
        assert_eq!(store.append_calls(), 0);
        assert_eq!(cache.set_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_skips_cache() {
        let (store, cache, coordinator) = setup();
        store.set_unavailable(true);
        let err = coordinator.ingest(record("d1", 1)).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::PersistenceFailed(StoreError::Unavailable { .. })
        ));
        assert_eq!(cache.set_calls(), 0);
        assert!(cache.peek("d1").is_none());
    }

    #[tokio::test]
    async fn test_cache_failure_still_succeeds() {
        let (store, cache, coordinator) = setup();
        cache.set_unavailable(true);
        let ack = coordinator.ingest(record("d1", 1)).await.unwrap();

        assert!(!ack.cached);
        assert_eq!(store.row_count(), 1);
        assert!(store.latest("d1").await.unwrap().is_some());
        assert_eq!(coordinator.stats().snapshot().cache_write_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_append_times_out_without_retry() {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        store.set_latency(Duration::from_secs(5));
        let coordinator = IngestCoordinator::new(
            store.clone(),
            cache.clone(),
            CoordinatorConfig::new().with_call_timeout(Duration::from_millis(100)),
        );

        let err = coordinator.ingest(record("d1", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::PersistenceFailed(StoreError::Timeout { .. })
        ));
        assert_eq!(store.append_calls(), 1);
        assert_eq!(cache.set_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cache_does_not_fail_ingest() {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        cache.set_latency(Duration::from_secs(5));
        let coordinator = IngestCoordinator::new(
            store.clone(),
            cache.clone(),
            CoordinatorConfig::new().with_call_timeout(Duration::from_millis(100)),
        );

        let ack = coordinator.ingest(record("d1", 1)).await.unwrap();
        assert!(!ack.cached);
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_last_writer_wins_in_cache() {
        let (_store, cache, coordinator) = setup();
        coordinator.ingest(record("d1", 2000)).await.unwrap();
        coordinator.ingest(record("d1", 1000)).await.unwrap();

        let cached = decode_record(&cache.peek("d1").unwrap()).unwrap();
        assert_eq!(cached.timestamp, 1000);
    }
}
