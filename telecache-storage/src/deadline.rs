//! Per-call deadlines.
//!
//! Every store and cache call runs under a deadline. Expiry is reported as the
//! backend's own `Timeout` variant so callers handle it like any other fault.
//! Only idempotent durable reads are retried, and only once.

use std::future::Future;
use std::time::Duration;

use telecache_core::{CacheError, StoreError};
use tracing::warn;

/// Run a durable store call under `deadline`.
pub async fn with_store_deadline<T, F>(
    operation: &str,
    deadline: Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation: operation.to_string(),
            after: deadline,
        }),
    }
}

/// Run a cache call under `deadline`.
pub async fn with_cache_deadline<T, F>(
    operation: &str,
    deadline: Duration,
    fut: F,
) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout {
            operation: operation.to_string(),
            after: deadline,
        }),
    }
}

/// Run an idempotent durable read under `deadline`, retrying once on timeout.
///
/// Errors other than a timeout are returned immediately.
pub async fn read_with_retry<T, F, Fut>(
    operation: &str,
    deadline: Duration,
    mut call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match with_store_deadline(operation, deadline, call()).await {
        Err(StoreError::Timeout { .. }) => {
            warn!(operation, ?deadline, "durable read timed out, retrying once");
            with_store_deadline(operation, deadline, call()).await
        }
        other => other,
    }
}
