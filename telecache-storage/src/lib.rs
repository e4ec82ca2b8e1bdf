//! Telecache Storage - Store Traits and Cache-Aside Coordinators
//!
//! Defines the `DurableStore` and `FastCache` abstractions, in-memory
//! implementations of both, and the two coordinators that sit on top:
//!
//! - [`IngestCoordinator`]: durable append first, then a best-effort cache write.
//! - [`RetrievalCoordinator`]: cache first, durable fallback, then repopulate.
//!
//! The PostgreSQL and Redis adapters live in `telecache-api`.

pub mod config;
pub mod deadline;
pub mod ingest;
pub mod memory;
pub mod retrieval;
pub mod stats;
pub mod traits;

use std::sync::Arc;

pub use config::{CoordinatorConfig, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_HISTORY};
pub use deadline::{read_with_retry, with_cache_deadline, with_store_deadline};
pub use ingest::{IngestAck, IngestCoordinator};
pub use memory::{InMemoryDurableStore, InMemoryFastCache};
pub use retrieval::{ReadPath, Retrieval, RetrievalCoordinator};
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use traits::{DurableStore, FastCache, SharedDurableStore, SharedFastCache};

/// Build both coordinators over the same store handles and one stats counter.
pub fn build_coordinators(
    store: SharedDurableStore,
    cache: SharedFastCache,
    config: CoordinatorConfig,
) -> (IngestCoordinator, RetrievalCoordinator) {
    let stats = Arc::new(CoordinatorStats::new());
    let ingest = IngestCoordinator::new(store.clone(), cache.clone(), config.clone())
        .with_stats(stats.clone());
    let retrieval = RetrievalCoordinator::new(store, cache, config).with_stats(stats);
    (ingest, retrieval)
}
