//! SQLite-backed store
//!
//! Default persistence for a single-host deployment. The database lives at
//! `<data_dir>/gateway.db` and the schema is created on first open.

use crate::domain::{
    AlertHistoryEntry, AlertScope, AlertSettings, ApiKey, PerformanceMetric, RequestLogEntry,
};
use crate::infrastructure::store::{ApiKeyStore, GatewayStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

/// File name of the database inside the data directory
pub const DATABASE_FILE: &str = "gateway.db";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS api_keys (
        key_digest TEXT PRIMARY KEY,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS request_logs (
        id TEXT PRIMARY KEY,
        api_id TEXT NOT NULL,
        method TEXT NOT NULL,
        path TEXT NOT NULL,
        request_body TEXT,
        status INTEGER NOT NULL,
        response_time_ms INTEGER NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_request_logs_api_created
        ON request_logs (api_id, created_at)"#,
    r#"CREATE TABLE IF NOT EXISTS performance_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        api_id TEXT NOT NULL,
        metric_type TEXT NOT NULL,
        value REAL NOT NULL,
        timestamp TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS alert_settings (
        scope TEXT PRIMARY KEY,
        response_time_threshold REAL,
        error_rate_threshold REAL,
        cpu_threshold REAL,
        memory_threshold REAL,
        notifications_enabled INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS alert_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        api_id TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        value REAL NOT NULL,
        threshold REAL NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
];

/// Store backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database inside `data_dir`
    pub async fn open(data_dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", data_dir.display())))?;

        let path = data_dir.join(DATABASE_FILE);
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "Opened gateway database");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Register a key; re-registering an existing key re-activates it
    pub async fn insert_api_key(&self, key: &ApiKey) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO api_keys (key_digest, active, created_at) VALUES (?1, 1, ?2)
             ON CONFLICT(key_digest) DO UPDATE SET active = 1",
        )
        .bind(key.digest().as_ref())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!(key = key.digest().short(), "Registered API key");
        Ok(())
    }

    pub async fn deactivate_api_key(&self, key: &ApiKey) -> Result<(), StorageError> {
        sqlx::query("UPDATE api_keys SET active = 0 WHERE key_digest = ?1")
            .bind(key.digest().as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_alert_settings(
        &self,
        scope: &AlertScope,
        settings: &AlertSettings,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO alert_settings (scope, response_time_threshold, error_rate_threshold,
                cpu_threshold, memory_threshold, notifications_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(scope) DO UPDATE SET
                response_time_threshold = excluded.response_time_threshold,
                error_rate_threshold = excluded.error_rate_threshold,
                cpu_threshold = excluded.cpu_threshold,
                memory_threshold = excluded.memory_threshold,
                notifications_enabled = excluded.notifications_enabled",
        )
        .bind(scope.storage_key())
        .bind(settings.response_time_threshold)
        .bind(settings.error_rate_threshold)
        .bind(settings.cpu_threshold)
        .bind(settings.memory_threshold)
        .bind(settings.notifications_enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn request_log_count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM request_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}

#[async_trait]
impl ApiKeyStore for SqliteStore {
    async fn validate_api_key(&self, key: &ApiKey) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT active FROM api_keys WHERE key_digest = ?1")
            .bind(key.digest().as_ref())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<i64, _>("active")? != 0),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl GatewayStore for SqliteStore {
    async fn save_request_log(&self, entry: &RequestLogEntry) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO request_logs (id, api_id, method, path, request_body, status,
                response_time_ms, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(entry.id.to_string())
        .bind(entry.api_id.as_ref())
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(entry.request_body.as_deref())
        .bind(i64::from(entry.status))
        .bind(i64::try_from(entry.response_time_ms).unwrap_or(i64::MAX))
        .bind(entry.error.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_performance_metric(
        &self,
        metric: &PerformanceMetric,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO performance_metrics (api_id, metric_type, value, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(metric.api_id.as_ref())
        .bind(metric.metric_type.as_str())
        .bind(metric.value)
        .bind(metric.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_alert_settings(
        &self,
        scope: &AlertScope,
    ) -> Result<Option<AlertSettings>, StorageError> {
        let row = sqlx::query(
            "SELECT response_time_threshold, error_rate_threshold, cpu_threshold,
                memory_threshold, notifications_enabled
             FROM alert_settings WHERE scope = ?1",
        )
        .bind(scope.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(AlertSettings {
            response_time_threshold: row.try_get("response_time_threshold")?,
            error_rate_threshold: row.try_get("error_rate_threshold")?,
            cpu_threshold: row.try_get("cpu_threshold")?,
            memory_threshold: row.try_get("memory_threshold")?,
            notifications_enabled: row.try_get("notifications_enabled")?,
        }))
    }

    async fn save_alert_history(&self, entry: &AlertHistoryEntry) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO alert_history (api_id, alert_type, value, threshold, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(entry.api_id.as_ref())
        .bind(entry.alert_type.as_str())
        .bind(entry.value)
        .bind(entry.threshold)
        .bind(&entry.message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
