//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level so a single run can
//! be made more verbose without touching configuration files.

use crate::config::LoggingSettings;
use crate::domain::config_types::LogFormat;
use tracing_subscriber::EnvFilter;

pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.level.as_str()))
}

/// Install the global subscriber; later calls are no-ops
pub fn init(settings: &LoggingSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .with_target(true);

    // try_init fails only when a subscriber is already installed
    let _ = match settings.format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}
