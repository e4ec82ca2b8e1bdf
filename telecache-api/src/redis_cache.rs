//! Redis-backed [`FastCache`].
//!
//! Entries are stored under the raw device id with a millisecond expiry.
//! Enumeration walks the keyspace with `SCAN`; `KEYS` is never issued.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use telecache_core::CacheError;
use telecache_storage::FastCache;

use crate::config::parse_or;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// `host:port`
    pub addr: String,
    /// Password, empty for none
    pub password: String,
    /// Logical database index
    pub db: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            password: String::new(),
            db: 0,
        }
    }
}

impl CacheConfig {
    /// Load from `REDIS_ADDR`, `REDIS_PASSWORD` and `TELECACHE_CACHE_DB`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            addr: lookup("REDIS_ADDR").unwrap_or(defaults.addr),
            password: lookup("REDIS_PASSWORD").unwrap_or_default(),
            db: parse_or(&lookup, "TELECACHE_CACHE_DB", defaults.db),
        }
    }

    /// Connection URL. The password is percent-encoded.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!(
                "redis://:{}@{}/{}",
                urlencoding::encode(&self.password),
                self.addr,
                self.db
            )
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Cache over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisFastCache {
    conn: ConnectionManager,
}

impl RedisFastCache {
    /// Open the client and establish the managed connection.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url()).map_err(unavailable)?;
        let conn = client.get_connection_manager().await.map_err(unavailable)?;
        tracing::info!(addr = %config.addr, db = config.db, "Connected to Redis");
        Ok(Self { conn })
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable {
        reason: err.to_string(),
    }
}

/// Millisecond expiry for `SET PX`; Redis rejects zero.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl FastCache for RedisFastCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;

            // Device ids are UTF-8; anything else was not written by us.
            keys.extend(batch.into_iter().filter_map(|k| String::from_utf8(k).ok()));

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(count = keys.len(), "Scanned cache keys");
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        assert_eq!(CacheConfig::default().url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_password_is_encoded() {
        let config = CacheConfig::from_lookup(|key| match key {
            "REDIS_ADDR" => Some("cache:6380".to_string()),
            "REDIS_PASSWORD" => Some("p@ss word".to_string()),
            "TELECACHE_CACHE_DB" => Some("2".to_string()),
            _ => None,
        });
        assert_eq!(config.url(), "redis://:p%40ss%20word@cache:6380/2");
    }

    #[test]
    fn test_expiry_is_at_least_one_milli() {
        assert_eq!(expiry_millis(Duration::ZERO), 1);
        assert_eq!(expiry_millis(Duration::from_secs(3600)), 3_600_000);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let config = CacheConfig {
            addr: "127.0.0.1:1".to_string(),
            ..CacheConfig::default()
        };
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            RedisFastCache::connect(&config),
        )
        .await;
        if let Ok(outcome) = result {
            assert!(matches!(outcome, Err(CacheError::Unavailable { .. })));
        }
    }
}
