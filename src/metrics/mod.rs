//! Performance metrics and alerting
//!
//! Request outcomes feed per-metric buffers; flushed aggregates are persisted
//! and checked against alert thresholds.

pub mod alerts;
pub mod collector;
pub mod process;

pub use alerts::AlertEvaluator;
pub use collector::{CollectorConfig, MetricsCollector, RequestOutcome};
pub use process::{ProcessProbe, ProcessSampler, ProcessSnapshot, ProcessUsage, SysinfoProbe};
