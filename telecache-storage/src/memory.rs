//! In-memory store implementations for testing.
//!
//! Both stores can be switched into an outage (every call fails) and given an
//! artificial per-call latency, so the coordinators' failure and deadline
//! paths can be exercised without PostgreSQL or Redis. TTLs are measured with
//! `tokio::time::Instant`, which lets tests pause and advance the clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use telecache_core::{CacheError, StoreError, TelemetryRecord, TelemetryRow};
use tokio::time::Instant;

use crate::traits::{DurableStore, FastCache};

/// Shared fault-injection switches.
#[derive(Debug, Default)]
struct Faults {
    down: AtomicBool,
    latency_ms: AtomicU64,
}

impl Faults {
    fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

// ============================================================================
// DURABLE STORE
// ============================================================================

/// In-memory append-only store.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    rows: RwLock<HashMap<String, Vec<TelemetryRow>>>,
    faults: Faults,
    append_calls: AtomicU64,
    read_calls: AtomicU64,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (`true`) or succeed (`false`).
    pub fn set_unavailable(&self, down: bool) {
        self.faults.down.store(down, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Total rows held across all devices.
    pub fn row_count(&self) -> usize {
        self.rows
            .read()
            .map(|rows| rows.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Number of `append` calls that reached the store.
    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Number of `latest` and `history` calls that reached the store.
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Insert a row directly, bypassing fault injection and call counters.
    pub fn seed(&self, row: TelemetryRow) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        rows.entry(row.device_id.clone()).or_default().push(row);
        Ok(())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.faults.is_down() {
            return Err(StoreError::Unavailable {
                reason: "in-memory store switched off".to_string(),
            });
        }
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable {
        reason: "in-memory store lock poisoned".to_string(),
    }
}

/// Apply the column rules PostgreSQL enforces on insert: the payload must
/// be a JSON object and no text may contain NUL.
fn check_storable(row: &TelemetryRow) -> Result<(), StoreError> {
    let record = TelemetryRecord::from_row(row.clone()).map_err(|e| StoreError::Query {
        reason: format!("invalid input syntax for type json: {}", e),
    })?;
    match record.nul_field() {
        Some(field) => Err(StoreError::Query {
            reason: format!("{} contains a NUL character", field),
        }),
        None => Ok(()),
    }
}

/// Newest-first ordering: higher timestamp first, later insertion first on ties.
fn newest_first(rows: &[TelemetryRow]) -> Vec<TelemetryRow> {
    let mut indexed: Vec<(usize, &TelemetryRow)> = rows.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
    indexed.into_iter().map(|(_, row)| row.clone()).collect()
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn append(&self, row: &TelemetryRow) -> Result<(), StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.delay().await;
        self.check_available()?;
        check_storable(row)?;
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        rows.entry(row.device_id.clone()).or_default().push(row.clone());
        Ok(())
    }

    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryRow>, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.delay().await;
        self.check_available()?;
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .get(device_id)
            .and_then(|device_rows| newest_first(device_rows).into_iter().next()))
    }

    async fn history(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<TelemetryRow>, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.delay().await;
        self.check_available()?;
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .get(device_id)
            .map(|device_rows| newest_first(device_rows).into_iter().take(limit).collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.faults.delay().await;
        self.check_available()
    }
}

// ============================================================================
// FAST CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory TTL cache.
#[derive(Debug, Default)]
pub struct InMemoryFastCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    faults: Faults,
    set_calls: AtomicU64,
}

impl InMemoryFastCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (`true`) or succeed (`false`).
    pub fn set_unavailable(&self, down: bool) {
        self.faults.down.store(down, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Store raw bytes under `key`, bypassing fault injection.
    ///
    /// Used to plant corrupt or foreign entries.
    pub fn plant(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| cache_poisoned())?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    /// Read raw bytes, bypassing fault injection. Expired entries read as `None`.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().ok()?;
        let now = Instant::now();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now)
    }

    /// Number of `set` calls that reached the cache.
    pub fn set_calls(&self) -> u64 {
        self.set_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.faults.is_down() {
            return Err(CacheError::Unavailable {
                reason: "in-memory cache switched off".to_string(),
            });
        }
        Ok(())
    }
}

fn cache_poisoned() -> CacheError {
    CacheError::Unavailable {
        reason: "in-memory cache lock poisoned".to_string(),
    }
}

#[async_trait]
impl FastCache for InMemoryFastCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.faults.delay().await;
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| cache_poisoned())?;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.delay().await;
        self.check_available()?;
        self.plant(key, value, ttl)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.faults.delay().await;
        self.check_available()?;
        let entries = self.entries.read().map_err(|_| cache_poisoned())?;
        let now = Instant::now();
        Ok(entries
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.faults.delay().await;
        self.check_available()
    }
}
