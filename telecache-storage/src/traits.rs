//! Store traits for pluggable durable and cache backends.
//!
//! Both traits are object safe so the coordinators can hold
//! `Arc<dyn DurableStore>` / `Arc<dyn FastCache>` handles that are built at
//! startup and injected, with in-memory implementations substituted in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use telecache_core::{CacheError, StoreError, TelemetryRow};

/// Append-only persistence of telemetry rows.
///
/// No update or delete capability is used. Implementations must be safe for
/// concurrent use by many callers.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Append one row.
    async fn append(&self, row: &TelemetryRow) -> Result<(), StoreError>;

    /// The single most recent row for a device, by `timestamp` descending.
    ///
    /// Rows sharing the top timestamp resolve to the one inserted last.
    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryRow>, StoreError>;

    /// Up to `limit` rows for a device, newest first.
    async fn history(&self, device_id: &str, limit: usize)
        -> Result<Vec<TelemetryRow>, StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Key-value cache with per-entry expiration.
///
/// Last writer wins; no compare-and-set is required.
#[async_trait]
pub trait FastCache: Send + Sync {
    /// Read a key. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a key, replacing any previous value and resetting its TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Enumerate live keys. Linear in the number of cached devices.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Shared handle to a durable store.
pub type SharedDurableStore = Arc<dyn DurableStore>;

/// Shared handle to a fast cache.
pub type SharedFastCache = Arc<dyn FastCache>;
