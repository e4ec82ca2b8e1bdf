//! Database Connection Pool Module
//!
//! PostgreSQL-backed [`DurableStore`] using deadpool-postgres. Telemetry is
//! appended to a single `device_data` table and read back newest first.
//! The payload column is JSONB; it is written from and read as text so the
//! store never interprets it.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use telecache_core::{StoreError, TelemetryRow};
use telecache_storage::DurableStore;
use tokio_postgres::NoTls;

use crate::config::parse_or;
use crate::error::{ApiError, ApiResult};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS device_data (
    id          BIGSERIAL PRIMARY KEY,
    device_id   TEXT   NOT NULL,
    device_type TEXT   NOT NULL DEFAULT '',
    "timestamp" BIGINT NOT NULL,
    data        JSONB  NOT NULL
);
CREATE INDEX IF NOT EXISTS device_data_latest_idx
    ON device_data (device_id, "timestamp" DESC, id DESC);
"#;

const INSERT_SQL: &str = r#"INSERT INTO device_data (device_id, device_type, "timestamp", data) VALUES ($1, $2, $3, CAST($4::text AS jsonb))"#;

const LATEST_SQL: &str = r#"SELECT device_id, device_type, "timestamp", data::text FROM device_data WHERE device_id = $1 ORDER BY "timestamp" DESC, id DESC LIMIT 1"#;

const HISTORY_SQL: &str = r#"SELECT device_id, device_type, "timestamp", data::text FROM device_data WHERE device_id = $1 ORDER BY "timestamp" DESC, id DESC LIMIT $2"#;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
    /// Create the table and index at startup
    pub migrate: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "telemetry".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            migrate: true,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "DB_PORT", defaults.port),
            dbname: lookup("DB_NAME").unwrap_or(defaults.dbname),
            user: lookup("DB_USER").unwrap_or(defaults.user),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            max_size: parse_or(&lookup, "TELECACHE_DB_POOL_SIZE", defaults.max_size),
            timeout: defaults.timeout,
            migrate: lookup("TELECACHE_DB_MIGRATE")
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened until the pool is first used.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size.max(1));
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// DURABLE STORE
// ============================================================================

/// Append-only telemetry table behind a connection pool.
#[derive(Clone)]
pub struct PgDurableStore {
    pool: Pool,
}

impl PgDurableStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the telemetry table and its lookup index if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(query_error)?;
        tracing::info!("device_data schema ensured");
        Ok(())
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool.get().await.map_err(pool_error)
    }
}

fn pool_error(err: deadpool_postgres::PoolError) -> StoreError {
    tracing::error!("Connection pool error: {:?}", err);
    StoreError::Unavailable {
        reason: err.to_string(),
    }
}

fn query_error(err: tokio_postgres::Error) -> StoreError {
    let reason = match err.as_db_error() {
        Some(db) => db.to_string(),
        None => err.to_string(),
    };
    StoreError::Query { reason }
}

fn row_from_pg(row: &tokio_postgres::Row) -> Result<TelemetryRow, StoreError> {
    let data: String = row.try_get(3).map_err(query_error)?;
    Ok(TelemetryRow {
        device_id: row.try_get(0).map_err(query_error)?,
        device_type: row.try_get(1).map_err(query_error)?,
        timestamp: row.try_get(2).map_err(query_error)?,
        payload: data.into_bytes(),
    })
}

#[async_trait]
impl DurableStore for PgDurableStore {
    async fn append(&self, row: &TelemetryRow) -> Result<(), StoreError> {
        let payload = std::str::from_utf8(&row.payload).map_err(|e| StoreError::Query {
            reason: format!("payload is not UTF-8: {}", e),
        })?;
        let conn = self.get_conn().await?;
        conn.execute(
            INSERT_SQL,
            &[&row.device_id, &row.device_type, &row.timestamp, &payload],
        )
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryRow>, StoreError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(LATEST_SQL, &[&device_id])
            .await
            .map_err(query_error)?;
        row.as_ref().map(row_from_pg).transpose()
    }

    async fn history(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<TelemetryRow>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.get_conn().await?;
        let rows = conn
            .query(HISTORY_SQL, &[&device_id, &limit])
            .await
            .map_err(query_error)?;
        rows.iter().map(row_from_pg).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(query_error)?;
        Ok(())
    }
}
