//! Performance metric types
//!
//! Samples are produced per request, buffered per `(api, metric type)` and
//! reduced to a single [`PerformanceMetric`] when a buffer is flushed.

use crate::domain::identifiers::ApiId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of metric the gateway samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    AvgResponseTime,
    RequestCount,
    ErrorRate,
    CpuUsage,
    MemoryUsage,
    TokenUsage,
}

/// How a buffer of raw samples is reduced to one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    /// Mean of a 0/1 ratio, scaled to a percentage
    MeanPercent,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::AvgResponseTime => "avg_response_time",
            MetricType::RequestCount => "request_count",
            MetricType::ErrorRate => "error_rate",
            MetricType::CpuUsage => "cpu_usage",
            MetricType::MemoryUsage => "memory_usage",
            MetricType::TokenUsage => "token_usage",
        }
    }

    pub fn aggregation(&self) -> Aggregation {
        match self {
            MetricType::RequestCount | MetricType::TokenUsage => Aggregation::Sum,
            MetricType::AvgResponseTime | MetricType::CpuUsage | MetricType::MemoryUsage => {
                Aggregation::Mean
            }
            MetricType::ErrorRate => Aggregation::MeanPercent,
        }
    }

    /// Reduce raw samples; `None` when there is nothing to reduce
    pub fn aggregate(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().sum();
        let mean = sum / values.len() as f64;
        Some(match self.aggregation() {
            Aggregation::Sum => sum,
            Aggregation::Mean => mean,
            Aggregation::MeanPercent => mean * 100.0,
        })
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric value for an api at a point in time
///
/// Used both for raw samples and for the aggregate persisted on flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub api_id: ApiId,
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
