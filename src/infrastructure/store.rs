//! Persistence contracts consumed by the gateway
//!
//! The gateway never owns the schema behind these traits. It only decides
//! when to call them and what to do when they fail: request logs, metrics and
//! alert history are best-effort, so a failing store degrades observability
//! without ever failing a request.

use crate::domain::{
    AlertHistoryEntry, AlertScope, AlertSettings, ApiKey, PerformanceMetric, RequestLogEntry,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Errors raised by persistence collaborators
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Validates bearer credentials
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// `true` when the key exists and is active
    async fn validate_api_key(&self, key: &ApiKey) -> Result<bool, StorageError>;
}

/// Sink for request logs, metrics and alerts, and source of alert settings
#[async_trait]
pub trait GatewayStore: Send + Sync {
    async fn save_request_log(&self, entry: &RequestLogEntry) -> Result<(), StorageError>;

    async fn save_performance_metric(&self, metric: &PerformanceMetric)
        -> Result<(), StorageError>;

    async fn get_alert_settings(
        &self,
        scope: &AlertScope,
    ) -> Result<Option<AlertSettings>, StorageError>;

    async fn save_alert_history(&self, entry: &AlertHistoryEntry) -> Result<(), StorageError>;
}

/// Outcome of a best-effort write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestEffort {
    Persisted,
    Dropped,
}

impl BestEffort {
    /// Swallow a persistence failure after reporting it
    pub fn from_result(operation: &'static str, result: Result<(), StorageError>) -> Self {
        match result {
            Ok(()) => BestEffort::Persisted,
            Err(error) => {
                warn!(operation, error = %error, "Best-effort write dropped");
                BestEffort::Dropped
            }
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, BestEffort::Persisted)
    }
}
