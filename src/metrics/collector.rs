//! Buffered metric collection
//!
//! Raw samples accumulate per `(api, metric type)`. A buffer is flushed once
//! it is older than the flush interval or holds the configured number of
//! samples; flushing reduces it to one [`PerformanceMetric`], persists it
//! and hands it to the alert evaluator.

use crate::background::PeriodicJob;
use crate::domain::config_types::{BufferCapacity, IntervalSecs};
use crate::domain::{ApiId, MetricType, PerformanceMetric};
use crate::infrastructure::{BestEffort, GatewayStore};
use crate::metrics::alerts::AlertEvaluator;
use crate::metrics::process::ProcessSampler;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// What the request path reports for each completed or aborted request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub api_id: ApiId,
    pub duration: Duration,
    pub status: u16,
    /// Total tokens reported by the engine, when the response carried usage
    pub tokens: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    pub flush_interval: Duration,
    pub max_buffer_size: usize,
}

impl CollectorConfig {
    pub fn new(flush_interval: IntervalSecs, max_buffer_size: BufferCapacity) -> Self {
        Self {
            flush_interval: flush_interval.as_duration(),
            max_buffer_size: max_buffer_size.into_inner(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(60),
            max_buffer_size: 100,
        }
    }
}

struct MetricBuffer {
    values: Vec<f64>,
    opened_at: Instant,
}

type BufferKey = (ApiId, MetricType);

pub struct MetricsCollector {
    config: CollectorConfig,
    store: Arc<dyn GatewayStore>,
    evaluator: AlertEvaluator,
    sampler: ProcessSampler,
    buffers: Mutex<HashMap<BufferKey, MetricBuffer>>,
}

impl MetricsCollector {
    pub fn new(
        config: CollectorConfig,
        store: Arc<dyn GatewayStore>,
        evaluator: AlertEvaluator,
        sampler: ProcessSampler,
    ) -> Self {
        Self {
            config,
            store,
            evaluator,
            sampler,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Record the samples for one request
    ///
    /// Never blocks on persistence: a buffer that reaches capacity is flushed
    /// on a spawned task.
    pub fn record_request(self: &Arc<Self>, outcome: RequestOutcome) {
        let mut samples = vec![
            (
                MetricType::AvgResponseTime,
                outcome.duration.as_secs_f64() * 1000.0,
            ),
            (MetricType::RequestCount, 1.0),
            (
                MetricType::ErrorRate,
                if outcome.status >= 400 { 1.0 } else { 0.0 },
            ),
        ];
        if let Some(usage) = self.sampler.sample() {
            samples.push((MetricType::CpuUsage, usage.cpu_percent));
            samples.push((MetricType::MemoryUsage, usage.memory_percent));
        }
        if let Some(tokens) = outcome.tokens {
            samples.push((MetricType::TokenUsage, tokens as f64));
        }

        let mut full = false;
        for (metric_type, value) in samples {
            full |= self.record(&outcome.api_id, metric_type, value);
        }

        if full {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let collector = Arc::clone(self);
                runtime.spawn(async move {
                    collector.flush_due().await;
                });
            }
        }
    }

    /// Append one raw sample; `true` when its buffer reached capacity
    pub fn record(&self, api_id: &ApiId, metric_type: MetricType, value: f64) -> bool {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .entry((api_id.clone(), metric_type))
            .or_insert_with(|| MetricBuffer {
                values: Vec::with_capacity(self.config.max_buffer_size),
                opened_at: Instant::now(),
            });
        buffer.values.push(value);
        buffer.values.len() >= self.config.max_buffer_size
    }

    /// Flush every buffer that is old enough or full
    pub async fn flush_due(&self) -> Vec<PerformanceMetric> {
        let now = Instant::now();
        let drained = self.drain(|buffer| {
            buffer.values.len() >= self.config.max_buffer_size
                || now.duration_since(buffer.opened_at) >= self.config.flush_interval
        });
        self.persist(drained).await
    }

    /// Flush everything regardless of age; used at shutdown
    pub async fn flush_all(&self) -> Vec<PerformanceMetric> {
        let drained = self.drain(|_| true);
        self.persist(drained).await
    }

    /// Number of samples waiting in one buffer
    pub fn buffered(&self, api_id: &ApiId, metric_type: MetricType) -> usize {
        self.buffers
            .lock()
            .get(&(api_id.clone(), metric_type))
            .map_or(0, |buffer| buffer.values.len())
    }

    fn drain(&self, due: impl Fn(&MetricBuffer) -> bool) -> Vec<(BufferKey, Vec<f64>)> {
        let mut buffers = self.buffers.lock();
        let keys: Vec<BufferKey> = buffers
            .iter()
            .filter(|(_, buffer)| due(buffer))
            .map(|(key, _)| key.clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| buffers.remove(&key).map(|buffer| (key, buffer.values)))
            .collect()
    }

    async fn persist(&self, drained: Vec<(BufferKey, Vec<f64>)>) -> Vec<PerformanceMetric> {
        let mut flushed = Vec::with_capacity(drained.len());

        for ((api_id, metric_type), values) in drained {
            let Some(value) = metric_type.aggregate(&values) else {
                continue;
            };
            let metric = PerformanceMetric {
                api_id,
                metric_type,
                value,
                timestamp: Utc::now(),
            };
            debug!(
                api_id = %metric.api_id,
                metric_type = %metric.metric_type,
                value = metric.value,
                samples = values.len(),
                "Flushing metric"
            );

            BestEffort::from_result(
                "save_performance_metric",
                self.store.save_performance_metric(&metric).await,
            );
            self.evaluator.evaluate(&metric).await;
            flushed.push(metric);
        }

        flushed
    }
}

#[async_trait]
impl PeriodicJob for MetricsCollector {
    fn name(&self) -> &'static str {
        "metrics_flush"
    }

    async fn tick(&self) {
        self.flush_due().await;
    }
}
