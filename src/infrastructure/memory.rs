//! In-memory store used by tests and embedders
//!
//! Writes can be made to fail on demand so callers can verify that a
//! persistence outage never reaches the request path.

use crate::domain::{
    AlertHistoryEntry, AlertScope, AlertSettings, ApiKey, KeyDigest, PerformanceMetric,
    RequestLogEntry,
};
use crate::infrastructure::store::{ApiKeyStore, GatewayStore, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    api_keys: Mutex<HashSet<KeyDigest>>,
    request_logs: Mutex<Vec<RequestLogEntry>>,
    metrics: Mutex<Vec<PerformanceMetric>>,
    alert_settings: Mutex<HashMap<String, AlertSettings>>,
    alert_history: Mutex<Vec<AlertHistoryEntry>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(self, key: &ApiKey) -> Self {
        self.insert_api_key(key);
        self
    }

    pub fn insert_api_key(&self, key: &ApiKey) {
        self.api_keys.lock().insert(key.digest());
    }

    pub fn set_alert_settings(&self, scope: &AlertScope, settings: AlertSettings) {
        self.alert_settings
            .lock()
            .insert(scope.storage_key().to_string(), settings);
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read (key validation, alert settings) fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn request_logs(&self) -> Vec<RequestLogEntry> {
        self.request_logs.lock().clone()
    }

    pub fn metrics(&self) -> Vec<PerformanceMetric> {
        self.metrics.lock().clone()
    }

    pub fn alert_history(&self) -> Vec<AlertHistoryEntry> {
        self.alert_history.lock().clone()
    }

    fn check_write(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store rejecting writes".to_string(),
            ));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store rejecting reads".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn validate_api_key(&self, key: &ApiKey) -> Result<bool, StorageError> {
        self.check_read()?;
        Ok(self.api_keys.lock().contains(&key.digest()))
    }
}

#[async_trait]
impl GatewayStore for MemoryStore {
    async fn save_request_log(&self, entry: &RequestLogEntry) -> Result<(), StorageError> {
        self.check_write()?;
        self.request_logs.lock().push(entry.clone());
        Ok(())
    }

    async fn save_performance_metric(
        &self,
        metric: &PerformanceMetric,
    ) -> Result<(), StorageError> {
        self.check_write()?;
        self.metrics.lock().push(metric.clone());
        Ok(())
    }

    async fn get_alert_settings(
        &self,
        scope: &AlertScope,
    ) -> Result<Option<AlertSettings>, StorageError> {
        self.check_read()?;
        Ok(self.alert_settings.lock().get(scope.storage_key()).cloned())
    }

    async fn save_alert_history(&self, entry: &AlertHistoryEntry) -> Result<(), StorageError> {
        self.check_write()?;
        self.alert_history.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_validation_uses_digest() {
        let key = ApiKey::try_new("sk-test".to_string()).unwrap();
        let other = ApiKey::try_new("sk-other".to_string()).unwrap();
        let store = MemoryStore::new().with_api_key(&key);

        assert!(store.validate_api_key(&key).await.unwrap());
        assert!(!store.validate_api_key(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_failure_injection() {
        let store = MemoryStore::new();
        store.fail_writes(true);

        let entry = AlertHistoryEntry {
            api_id: crate::domain::ApiId::try_new("api".to_string()).unwrap(),
            alert_type: crate::domain::AlertType::CpuUsage,
            value: 95.0,
            threshold: 90.0,
            message: "CPU".to_string(),
            created_at: chrono::Utc::now(),
        };

        assert!(store.save_alert_history(&entry).await.is_err());
        assert!(store.alert_history().is_empty());

        store.fail_writes(false);
        store.save_alert_history(&entry).await.unwrap();
        assert_eq!(store.alert_history().len(), 1);
    }
}
