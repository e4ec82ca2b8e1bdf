//! Telecache Test Utilities
//!
//! Shared test infrastructure for the Telecache workspace:
//! - Proptest generators for payloads and records
//! - Fixtures for common scenarios
//! - A harness wiring both coordinators over in-memory stores
//! - Assertions for coordinator outcomes

pub use telecache_core::{
    decode_record, encode_record, IngestError, Payload, RetrievalError, TelemetryRecord,
    TelemetryRow,
};
pub use telecache_storage::{
    build_coordinators, CoordinatorConfig, InMemoryDurableStore, InMemoryFastCache,
    IngestCoordinator, ReadPath, Retrieval, RetrievalCoordinator,
};

use std::sync::Arc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for telemetry types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Generate a device identifier.
    pub fn arb_device_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    /// Generate a device type label, possibly empty.
    pub fn arb_device_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just("sensor".to_string()),
            Just("meter".to_string()),
            "[a-z]{1,10}",
        ]
    }

    /// Generate a float that survives a JSON round trip exactly.
    pub fn arb_reading() -> impl Strategy<Value = f64> {
        (-4_000_000i32..4_000_000).prop_map(|n| f64::from(n) / 4.0)
    }

    /// Generate a JSON value nested up to three levels deep.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            arb_reading().prop_map(Value::from),
            "[ -~]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Generate an open payload object.
    pub fn arb_payload() -> impl Strategy<Value = Payload> {
        prop::collection::btree_map("[a-z_]{1,8}", arb_json_value(), 0..6)
            .prop_map(|m| Payload::from(m.into_iter().collect::<Map<String, Value>>()))
    }

    /// Generate a valid record.
    pub fn arb_record() -> impl Strategy<Value = TelemetryRecord> {
        (arb_device_id(), arb_device_type(), any::<i64>(), arb_payload()).prop_map(
            |(device_id, device_type, timestamp, data)| {
                TelemetryRecord::new(device_id, device_type, timestamp, data)
            },
        )
    }

    /// Generate a valid record for a fixed device.
    pub fn arb_record_for(device_id: String) -> impl Strategy<Value = TelemetryRecord> {
        (arb_device_type(), any::<i64>(), arb_payload()).prop_map(
            move |(device_type, timestamp, data)| {
                TelemetryRecord::new(device_id.clone(), device_type, timestamp, data)
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common testing scenarios.

    use super::*;
    use serde_json::json;

    /// The nested sample record: `d1`, `sensor`, timestamp 1000.
    pub fn nested_record() -> TelemetryRecord {
        TelemetryRecord::new(
            "d1",
            "sensor",
            1000,
            Payload::try_from(json!({"temp": 21.5, "tags": ["a", "b"]}))
                .unwrap_or_default(),
        )
    }

    /// The nested sample record as a raw request body.
    pub fn nested_record_body() -> &'static str {
        r#"{"device_id":"d1","device_type":"sensor","timestamp":1000,"data":{"temp":21.5,"tags":["a","b"]}}"#
    }

    /// A simple sensor reading.
    pub fn sensor_record(device_id: &str, timestamp: i64, temp: f64) -> TelemetryRecord {
        TelemetryRecord::new(
            device_id,
            "sensor",
            timestamp,
            Payload::try_from(json!({"temp": temp})).unwrap_or_default(),
        )
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Both coordinators wired over in-memory stores, with direct store handles
/// kept for fault injection and inspection.
pub struct Harness {
    pub store: Arc<InMemoryDurableStore>,
    pub cache: Arc<InMemoryFastCache>,
    pub ingest: IngestCoordinator,
    pub retrieval: RetrievalCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        let (ingest, retrieval) = build_coordinators(store.clone(), cache.clone(), config);
        Self {
            store,
            cache,
            ingest,
            retrieval,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for coordinator outcomes.

    use super::*;

    /// Assert a retrieval was answered from the cache.
    pub fn assert_cache_hit(retrieval: &Retrieval) {
        assert_eq!(
            retrieval.source,
            ReadPath::Cache,
            "Expected cache hit for {}",
            retrieval.record.device_id
        );
    }

    /// Assert a retrieval fell back to the durable store.
    pub fn assert_store_fallback(retrieval: &Retrieval) {
        assert_eq!(
            retrieval.source,
            ReadPath::Store,
            "Expected durable fallback for {}",
            retrieval.record.device_id
        );
    }

    /// Assert a result is `RetrievalError::NotFound`.
    pub fn assert_not_found<T: std::fmt::Debug>(result: &Result<T, RetrievalError>) {
        assert!(
            matches!(result, Err(RetrievalError::NotFound { .. })),
            "Expected NotFound, got {:?}",
            result
        );
    }

    /// Assert a result is `IngestError::PersistenceFailed`.
    pub fn assert_persistence_failed<T: std::fmt::Debug>(result: &Result<T, IngestError>) {
        assert!(
            matches!(result, Err(IngestError::PersistenceFailed(_))),
            "Expected PersistenceFailed, got {:?}",
            result
        );
    }
}
