use crate::adapter::EngineType;
use crate::domain::config_types::{
    BufferCapacity, ByteLimit, EngineBaseUrl, Host, IntervalSecs, LogFormat, LogLevel, Port,
    RequestBudget,
};
use crate::domain::{ApiId, ApiKey};
use crate::error::{Error, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix, e.g. `INFERENCE_GATEWAY__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "INFERENCE_GATEWAY";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub gateway: GatewaySettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub metrics: MetricsSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: Host,
    /// Plaintext port; HTTPS is served on `port + 1`
    pub port: Port,
    pub shutdown_grace_secs: IntervalSecs,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub base_url: EngineBaseUrl,
    pub engine: EngineType,
    pub request_timeout_secs: IntervalSecs,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    pub api_id: ApiId,
    pub max_request_bytes: ByteLimit,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub cache_ttl_secs: IntervalSecs,
    /// Keys registered in the store at startup
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub window_secs: IntervalSecs,
    pub max_requests: RequestBudget,
    /// PostgreSQL URL of the shared window store; local windows when absent
    pub store_url: Option<String>,
    pub cleanup_interval_secs: IntervalSecs,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsSettings {
    pub flush_interval_secs: IntervalSecs,
    pub max_buffer_size: BufferCapacity,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub capture_request_body: bool,
    pub max_body_bytes: ByteLimit,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Load defaults, then `config/default`, `config/{ENVIRONMENT}`,
    /// `config/local` and finally `INFERENCE_GATEWAY__*` variables
    pub fn new() -> Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.api_keys")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    /// Builder pre-populated with every default value
    pub fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.shutdown_grace_secs", 10)?
            .set_default("upstream.base_url", "http://localhost:11434")?
            .set_default("upstream.engine", "ollama")?
            .set_default("upstream.request_timeout_secs", 300)?
            .set_default("gateway.api_id", "default")?
            .set_default("gateway.max_request_bytes", 10 * 1024 * 1024)?
            .set_default("auth.cache_ttl_secs", 60)?
            .set_default("auth.api_keys", Vec::<String>::new())?
            .set_default("rate_limit.window_secs", 60)?
            .set_default("rate_limit.max_requests", 100)?
            .set_default("rate_limit.cleanup_interval_secs", 60)?
            .set_default("metrics.flush_interval_secs", 60)?
            .set_default("metrics.max_buffer_size", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("logging.capture_request_body", true)?
            .set_default("logging.max_body_bytes", 10_000)
    }

    /// Build, deserialize and cross-check a prepared builder
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port.tls_companion().is_none() {
            return Err(Error::invalid_setting(
                "server.port",
                format!(
                    "{} leaves no room for the HTTPS listener on the next port",
                    self.server.port
                ),
            ));
        }
        Ok(())
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        self.socket_addr(self.server.port)
    }

    pub fn https_addr(&self) -> Result<SocketAddr> {
        let port = self.server.port.tls_companion().ok_or_else(|| {
            Error::invalid_setting("server.port", "no companion port for HTTPS")
        })?;
        self.socket_addr(port)
    }

    fn socket_addr(&self, port: Port) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, port)
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                Error::invalid_setting("server.host", e.to_string())
            })
    }

    /// Resolve the data directory: configured path, then the platform data
    /// directory, then `./data`
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("inference-gateway")))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.server.shutdown_grace_secs.as_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(overrides: &[(&str, &str)]) -> Result<Settings> {
        let mut builder = Settings::defaults().unwrap();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        Settings::from_builder(builder)
    }

    #[test]
    fn test_settings_can_be_loaded() {
        let settings = Settings::new();
        assert!(settings.is_ok(), "{:?}", settings.err());
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[]).unwrap();

        assert_eq!(settings.server.port.into_inner(), 8080);
        assert_eq!(settings.upstream.engine, EngineType::Ollama);
        assert_eq!(settings.upstream.base_url.as_ref(), "http://localhost:11434");
        assert_eq!(settings.gateway.api_id.as_ref(), "default");
        assert_eq!(settings.rate_limit.max_requests.into_inner(), 100);
        assert!(settings.rate_limit.store_url.is_none());
        assert_eq!(settings.metrics.max_buffer_size.into_inner(), 100);
        assert_eq!(settings.logging.level, LogLevel::Info);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert!(settings.logging.capture_request_body);
        assert!(settings.auth.api_keys.is_empty());
    }

    #[test]
    fn test_https_listener_is_one_port_above() {
        let settings = load(&[("server.port", "9000")]).unwrap();
        assert_eq!(settings.http_addr().unwrap().port(), 9000);
        assert_eq!(settings.https_addr().unwrap().port(), 9001);
    }

    #[test]
    fn test_highest_port_is_rejected() {
        let error = load(&[("server.port", "65535")]).unwrap_err();
        assert!(matches!(
            error,
            Error::InvalidSetting {
                field: "server.port",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected_at_load() {
        assert!(load(&[("upstream.base_url", "https://engine.local")]).is_err());
        assert!(load(&[("rate_limit.max_requests", "0")]).is_err());
        assert!(load(&[("upstream.engine", "tensorrt")]).is_err());
        assert!(load(&[("gateway.api_id", "   ")]).is_err());
    }

    #[test]
    fn test_engine_names() {
        let settings = load(&[("upstream.engine", "lmstudio")]).unwrap();
        assert_eq!(settings.upstream.engine, EngineType::LmStudio);
    }

    #[test]
    fn test_configured_data_dir_wins() {
        let settings = load(&[("storage.data_dir", "/tmp/gateway-data")]).unwrap();
        assert_eq!(settings.data_dir(), PathBuf::from("/tmp/gateway-data"));
    }
}
