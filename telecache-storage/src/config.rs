//! Coordinator configuration.

use std::time::Duration;

use telecache_core::DEFAULT_CACHE_TTL_SECS;

/// Default per-call deadline for store and cache operations.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 2000;

/// Default upper bound on history reads.
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Configuration shared by the ingest and retrieval coordinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Lifetime of every cache entry written by a coordinator.
    pub cache_ttl: Duration,
    /// Deadline applied to each individual store or cache call.
    pub call_timeout: Duration,
    /// Largest number of rows a history read may return.
    pub max_history: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS), // 1 hour
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the history limit clamp. Zero is raised to one.
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max.max(1);
        self
    }

    /// Clamp a requested history limit into `1..=max_history`.
    pub fn clamp_history(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.max_history)
            .clamp(1, self.max_history.max(1))
    }
}
