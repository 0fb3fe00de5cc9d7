//! Alert settings and alert history
//!
//! Settings exist at two scopes: a global fallback and a per-api override.
//! Resolution is field by field, so an api override that only sets a CPU
//! threshold still inherits every other threshold from the global row.

use crate::domain::identifiers::ApiId;
use crate::domain::metrics::MetricType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key under which the global fallback settings are stored
pub const GLOBAL_SCOPE_KEY: &str = "global";

/// Which settings row to read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertScope {
    Global,
    Api(ApiId),
}

impl AlertScope {
    pub fn storage_key(&self) -> &str {
        match self {
            AlertScope::Global => GLOBAL_SCOPE_KEY,
            AlertScope::Api(api_id) => api_id.as_ref(),
        }
    }
}

/// Thresholds for one scope; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Milliseconds
    pub response_time_threshold: Option<f64>,
    /// Percent
    pub error_rate_threshold: Option<f64>,
    /// Percent
    pub cpu_threshold: Option<f64>,
    /// Percent
    pub memory_threshold: Option<f64>,
    pub notifications_enabled: Option<bool>,
}

impl AlertSettings {
    /// Overlay an api-specific row on the global row, field by field
    pub fn resolve(api: Option<&AlertSettings>, global: Option<&AlertSettings>) -> AlertSettings {
        let pick = |field: fn(&AlertSettings) -> Option<f64>| {
            api.and_then(field).or_else(|| global.and_then(field))
        };

        AlertSettings {
            response_time_threshold: pick(|s| s.response_time_threshold),
            error_rate_threshold: pick(|s| s.error_rate_threshold),
            cpu_threshold: pick(|s| s.cpu_threshold),
            memory_threshold: pick(|s| s.memory_threshold),
            notifications_enabled: api
                .and_then(|s| s.notifications_enabled)
                .or_else(|| global.and_then(|s| s.notifications_enabled)),
        }
    }

    /// Notifications default to on when neither scope says otherwise
    pub fn notifications_on(&self) -> bool {
        self.notifications_enabled.unwrap_or(true)
    }

    /// The threshold that applies to a metric, if that metric is alertable
    pub fn threshold_for(&self, metric: MetricType) -> Option<(AlertType, f64)> {
        let alert_type = AlertType::for_metric(metric)?;
        let threshold = match alert_type {
            AlertType::ResponseTime => self.response_time_threshold,
            AlertType::ErrorRate => self.error_rate_threshold,
            AlertType::CpuUsage => self.cpu_threshold,
            AlertType::MemoryUsage => self.memory_threshold,
        }?;
        Some((alert_type, threshold))
    }
}

/// Category of a raised alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ResponseTime,
    ErrorRate,
    CpuUsage,
    MemoryUsage,
}

impl AlertType {
    pub fn for_metric(metric: MetricType) -> Option<Self> {
        match metric {
            MetricType::AvgResponseTime => Some(AlertType::ResponseTime),
            MetricType::ErrorRate => Some(AlertType::ErrorRate),
            MetricType::CpuUsage => Some(AlertType::CpuUsage),
            MetricType::MemoryUsage => Some(AlertType::MemoryUsage),
            MetricType::RequestCount | MetricType::TokenUsage => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ResponseTime => "response_time",
            AlertType::ErrorRate => "error_rate",
            AlertType::CpuUsage => "cpu_usage",
            AlertType::MemoryUsage => "memory_usage",
        }
    }

    /// Human-readable breach message with fixed two-decimal precision
    pub fn message(&self, value: f64, threshold: f64) -> String {
        match self {
            AlertType::ResponseTime => format!(
                "Average response time {value:.2}ms exceeded threshold of {threshold:.2}ms"
            ),
            AlertType::ErrorRate => {
                format!("Error rate {value:.2}% exceeded threshold of {threshold:.2}%")
            }
            AlertType::CpuUsage => {
                format!("CPU usage {value:.2}% exceeded threshold of {threshold:.2}%")
            }
            AlertType::MemoryUsage => {
                format!("Memory usage {value:.2}% exceeded threshold of {threshold:.2}%")
            }
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a threshold breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub api_id: ApiId,
    pub alert_type: AlertType,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(
        response_time: Option<f64>,
        cpu: Option<f64>,
        notify: Option<bool>,
    ) -> AlertSettings {
        AlertSettings {
            response_time_threshold: response_time,
            cpu_threshold: cpu,
            notifications_enabled: notify,
            ..AlertSettings::default()
        }
    }

    #[test]
    fn test_api_override_wins_field_by_field() {
        let api = settings(Some(500.0), None, None);
        let global = settings(Some(2000.0), Some(90.0), Some(true));

        let resolved = AlertSettings::resolve(Some(&api), Some(&global));

        assert_eq!(resolved.response_time_threshold, Some(500.0));
        assert_eq!(resolved.cpu_threshold, Some(90.0));
        assert!(resolved.notifications_on());
    }

    #[test]
    fn test_api_notification_flag_overrides_global() {
        let api = settings(None, None, Some(false));
        let global = settings(Some(1000.0), None, Some(true));

        let resolved = AlertSettings::resolve(Some(&api), Some(&global));
        assert!(!resolved.notifications_on());
    }

    #[test]
    fn test_missing_scopes_resolve_to_nothing() {
        let resolved = AlertSettings::resolve(None, None);
        assert_eq!(resolved, AlertSettings::default());
        assert!(resolved.threshold_for(MetricType::CpuUsage).is_none());
    }

    #[test]
    fn test_counts_are_never_alertable() {
        let resolved = settings(Some(1.0), Some(1.0), None);
        assert!(resolved.threshold_for(MetricType::RequestCount).is_none());
        assert!(resolved.threshold_for(MetricType::TokenUsage).is_none());
    }

    #[test]
    fn test_message_uses_two_decimals() {
        let message = AlertType::CpuUsage.message(91.23456, 80.0);
        assert_eq!(message, "CPU usage 91.23% exceeded threshold of 80.00%");
    }
}
