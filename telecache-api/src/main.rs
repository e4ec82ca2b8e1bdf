//! Telecache API Server Entry Point
//!
//! Loads configuration (after an optional `.env` file), checks that
//! PostgreSQL and Redis are reachable, optionally creates the telemetry
//! table, and serves the Axum router until Ctrl-C or SIGTERM.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use telecache_api::{
    coordinator_config_from_env, create_api_router, init_tracing, load_env_file, ApiError,
    ApiResult, CacheConfig, DbConfig, PgDurableStore, RedisFastCache, ServerConfig,
    TelemetryConfig,
};
use telecache_storage::{DurableStore, FastCache};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let env_file = load_env_file();
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;
    match env_file {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "Loaded environment file"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable environment file"),
    }

    let server_config = ServerConfig::from_env()?;
    let coordinator_config = coordinator_config_from_env();
    let startup_timeout = server_config.startup_timeout;

    let db_config = DbConfig::from_env();
    let store = PgDurableStore::from_config(&db_config)?;
    startup_check("PostgreSQL", startup_timeout, store.ping()).await?;
    if db_config.migrate {
        startup_check("Schema migration", startup_timeout, store.ensure_schema()).await?;
    }
    tracing::info!(
        host = %db_config.host,
        dbname = %db_config.dbname,
        pool_size = db_config.max_size,
        "Durable store ready"
    );

    let cache_config = CacheConfig::from_env();
    let cache = startup_check("Redis", startup_timeout, RedisFastCache::connect(&cache_config)).await?;
    startup_check("Redis", startup_timeout, cache.ping()).await?;

    let app = create_api_router(
        Arc::new(store),
        Arc::new(cache),
        coordinator_config.clone(),
        &server_config,
    );

    let addr = server_config.bind_addr()?;
    tracing::info!(
        %addr,
        cache_ttl_secs = coordinator_config.cache_ttl.as_secs(),
        call_timeout_ms = coordinator_config.call_timeout.as_millis() as u64,
        "Starting Telecache API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Await a startup dependency with a bounded wait.
async fn startup_check<T, E, F>(name: &str, deadline: Duration, fut: F) -> ApiResult<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(dependency = name, error = %e, "Startup check failed");
            Err(ApiError::service_unavailable(format!("{} unavailable: {}", name, e)))
        }
        Err(_) => {
            tracing::error!(dependency = name, ?deadline, "Startup check timed out");
            Err(ApiError::service_unavailable(format!(
                "{} did not respond within {:?}",
                name, deadline
            )))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
