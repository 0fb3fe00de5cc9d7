//! Threshold evaluation for flushed metrics

use crate::domain::{AlertHistoryEntry, AlertScope, AlertSettings, ApiId, PerformanceMetric};
use crate::infrastructure::{BestEffort, GatewayStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

pub struct AlertEvaluator {
    store: Arc<dyn GatewayStore>,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }

    /// Compare one aggregated metric against its resolved threshold
    ///
    /// Returns the alert when one was raised. A value equal to the threshold
    /// does not alert.
    pub async fn evaluate(&self, metric: &PerformanceMetric) -> Option<AlertHistoryEntry> {
        let settings = self.resolved_settings(&metric.api_id).await?;
        if !settings.notifications_on() {
            return None;
        }

        let (alert_type, threshold) = settings.threshold_for(metric.metric_type)?;
        if metric.value <= threshold {
            return None;
        }

        let entry = AlertHistoryEntry {
            api_id: metric.api_id.clone(),
            alert_type,
            value: metric.value,
            threshold,
            message: alert_type.message(metric.value, threshold),
            created_at: Utc::now(),
        };

        warn!(
            api_id = %entry.api_id,
            alert_type = %entry.alert_type,
            value = entry.value,
            threshold = entry.threshold,
            "{}", entry.message
        );
        BestEffort::from_result(
            "save_alert_history",
            self.store.save_alert_history(&entry).await,
        );

        Some(entry)
    }

    async fn resolved_settings(&self, api_id: &ApiId) -> Option<AlertSettings> {
        let api = self.load(&AlertScope::Api(api_id.clone())).await?;
        let global = self.load(&AlertScope::Global).await?;
        Some(AlertSettings::resolve(api.as_ref(), global.as_ref()))
    }

    /// Outer `None` means the settings could not be read at all
    async fn load(&self, scope: &AlertScope) -> Option<Option<AlertSettings>> {
        match self.store.get_alert_settings(scope).await {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(
                    scope = scope.storage_key(),
                    error = %e,
                    "Failed to load alert settings; skipping evaluation"
                );
                None
            }
        }
    }
}
