//! API Configuration Module
//!
//! Server and coordinator settings loaded from environment variables with
//! defaults for local development. Every loader has a `from_lookup` twin
//! taking a key lookup function so it can be exercised without touching the
//! process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use telecache_core::DEFAULT_CACHE_TTL_SECS;
use telecache_storage::{CoordinatorConfig, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_HISTORY};

use crate::error::{ApiError, ApiResult};

/// Default request body cap (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default startup connectivity deadline.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 5;

/// Parse `key` from `lookup`, falling back to `default` when absent or invalid.
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Load a `.env` file from the working directory or one of its parents.
///
/// Variables already present in the process environment are left as they
/// are. A missing file is not an error.
pub fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// HTTP listener and request handling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Deadline for the connectivity checks made before serving.
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TELECACHE_BIND`: Listen host (default: 0.0.0.0)
    /// - `PORT`: Listen port (default: 8080). An unparseable value is an error.
    /// - `TELECACHE_MAX_BODY_BYTES`: Request body cap (default: 1048576)
    /// - `TELECACHE_STARTUP_TIMEOUT_SECS`: Startup ping deadline (default: 5)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => defaults.port,
        };

        Ok(Self {
            host: lookup("TELECACHE_BIND").unwrap_or(defaults.host),
            port,
            max_body_bytes: parse_or(&lookup, "TELECACHE_MAX_BODY_BYTES", defaults.max_body_bytes),
            startup_timeout: Duration::from_secs(parse_or(
                &lookup,
                "TELECACHE_STARTUP_TIMEOUT_SECS",
                DEFAULT_STARTUP_TIMEOUT_SECS,
            )),
        })
    }

    /// Resolve the socket address to bind.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

// ============================================================================
// COORDINATOR CONFIGURATION
// ============================================================================

/// Create the coordinator configuration from environment variables.
///
/// Environment variables:
/// - `TELECACHE_CACHE_TTL_SECS`: Cache entry lifetime (default: 3600)
/// - `TELECACHE_STORE_TIMEOUT_MS`: Per-call deadline (default: 2000)
/// - `TELECACHE_MAX_HISTORY`: History limit clamp (default: 100)
pub fn coordinator_config_from_env() -> CoordinatorConfig {
    coordinator_config_from_lookup(|key| std::env::var(key).ok())
}

pub fn coordinator_config_from_lookup<F>(lookup: F) -> CoordinatorConfig
where
    F: Fn(&str) -> Option<String>,
{
    CoordinatorConfig::new()
        .with_ttl(Duration::from_secs(parse_or(
            &lookup,
            "TELECACHE_CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL_SECS,
        )))
        .with_call_timeout(Duration::from_millis(parse_or(
            &lookup,
            "TELECACHE_STORE_TIMEOUT_MS",
            DEFAULT_CALL_TIMEOUT_MS,
        )))
        .with_max_history(parse_or(&lookup, "TELECACHE_MAX_HISTORY", DEFAULT_MAX_HISTORY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn test_server_config_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("TELECACHE_BIND", "127.0.0.1"),
            ("TELECACHE_STARTUP_TIMEOUT_SECS", "1"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9090");
        assert_eq!(config.startup_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.message.contains("eighty"));
    }

    #[test]
    fn test_env_file_entries_feed_config() {
        let path = std::env::temp_dir().join(format!("telecache-{}.env", std::process::id()));
        std::fs::write(&path, "# local overrides\nPORT=9191\nTELECACHE_CACHE_TTL_SECS=\"120\"\n")
            .unwrap();
        let entries: HashMap<String, String> = dotenvy::from_path_iter(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        let server = ServerConfig::from_lookup(|key| entries.get(key).cloned()).unwrap();
        assert_eq!(server.port, 9191);
        let coordinator = coordinator_config_from_lookup(|key| entries.get(key).cloned());
        assert_eq!(coordinator.cache_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("TELECACHE_MAX_BODY_BYTES", "lots")]))
            .unwrap();
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);

        let coordinator = coordinator_config_from_lookup(lookup(&[
            ("TELECACHE_CACHE_TTL_SECS", "-5"),
            ("TELECACHE_STORE_TIMEOUT_MS", "250"),
        ]));
        assert_eq!(coordinator.cache_ttl, Duration::from_secs(3600));
        assert_eq!(coordinator.call_timeout, Duration::from_millis(250));
        assert_eq!(coordinator.max_history, 100);
    }
}
