use crate::adapter::adapter_for;
use crate::auth::Authenticator;
use crate::background::BackgroundTask;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::gateway::{GatewayService, RequestLogConfig, RequestLogger};
use crate::infrastructure::SqliteStore;
use crate::metrics::{AlertEvaluator, CollectorConfig, MetricsCollector, ProcessSampler};
use crate::rate_limit::{
    LocalRateLimiter, RateLimitCleanup, RateLimitPolicy, RateLimiter, SharedRateLimiter,
};
use crate::tls::{redirect_router, server_config, CertificateStore, SelfSignedCertificateStore};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// Extra time allowed for listeners to wind down after the grace period
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

/// Main application struct that coordinates all components
///
/// Building it performs every fallible startup step: certificates, store,
/// and both listeners. Nothing is bound until a usable certificate exists.
pub struct Application {
    settings: Settings,
    store: Arc<SqliteStore>,
    metrics: Arc<MetricsCollector>,
    rate_limiter: Arc<dyn RateLimiter>,
    request_logger: Arc<RequestLogger>,
    router: Router,
    tls: RustlsConfig,
    http_listener: TcpListener,
    https_listener: std::net::TcpListener,
}

impl Application {
    #[instrument]
    pub async fn new() -> Result<Self> {
        let settings = Settings::new()?;
        Self::build(settings).await
    }

    /// Build with the default self-signed certificate store
    pub async fn build(settings: Settings) -> Result<Self> {
        let certificates = SelfSignedCertificateStore::new(&settings.data_dir());
        Self::build_with(settings, &certificates).await
    }

    #[instrument(skip_all, fields(api_id = %settings.gateway.api_id))]
    pub async fn build_with(
        settings: Settings,
        certificates: &dyn CertificateStore,
    ) -> Result<Self> {
        let http_addr = settings.http_addr()?;
        let https_addr = settings.https_addr()?;
        let data_dir = settings.data_dir();

        let pair = certificates
            .ensure_certificate(settings.gateway.api_id.as_ref(), settings.server.port)
            .await?;
        let tls = RustlsConfig::from_config(server_config(&pair)?);
        info!(cert = %pair.cert_path.display(), "TLS certificate ready");

        info!(data_dir = %data_dir.display(), "Opening gateway store");
        let store = Arc::new(SqliteStore::open(&data_dir).await?);
        for key in &settings.auth.api_keys {
            store.insert_api_key(key).await?;
        }
        if settings.auth.api_keys.is_empty() {
            warn!("No API keys configured; only keys already in the store will be accepted");
        }

        let rate_limiter = Self::rate_limiter(&settings).await?;

        let metrics = Arc::new(MetricsCollector::new(
            CollectorConfig::new(
                settings.metrics.flush_interval_secs,
                settings.metrics.max_buffer_size,
            ),
            store.clone(),
            AlertEvaluator::new(store.clone()),
            ProcessSampler::system(),
        ));

        let request_logger = Arc::new(RequestLogger::new(
            settings.gateway.api_id.clone(),
            store.clone(),
            metrics.clone(),
            RequestLogConfig {
                capture_body: settings.logging.capture_request_body,
                max_body_chars: settings.logging.max_body_bytes.into_inner(),
                max_request_bytes: settings.gateway.max_request_bytes.into_inner(),
            },
        ));

        let adapter = adapter_for(
            settings.upstream.engine,
            &settings.upstream.base_url,
            settings.upstream.request_timeout_secs.as_duration(),
        );
        info!(
            engine = %settings.upstream.engine,
            base_url = %settings.upstream.base_url,
            management_routes = adapter.supports_management(),
            "Upstream engine selected"
        );

        let router = GatewayService::new(
            adapter,
            Arc::new(Authenticator::new(
                store.clone(),
                settings.auth.cache_ttl_secs.as_duration(),
            )),
            rate_limiter.clone(),
            request_logger.clone(),
        )
        .into_router();

        let http_listener = TcpListener::bind(http_addr)
            .await
            .map_err(|e| Error::bind(http_addr, e))?;
        let https_listener = TcpListener::bind(https_addr)
            .await
            .map_err(|e| Error::bind(https_addr, e))?
            .into_std()?;
        // axum-server hands the socket back to tokio, which requires non-blocking mode
        https_listener.set_nonblocking(true)?;

        Ok(Self {
            settings,
            store,
            metrics,
            rate_limiter,
            request_logger,
            router,
            tls,
            http_listener,
            https_listener,
        })
    }

    async fn rate_limiter(settings: &Settings) -> Result<Arc<dyn RateLimiter>> {
        let policy = RateLimitPolicy::new(
            settings.rate_limit.window_secs,
            settings.rate_limit.max_requests,
        );

        let Some(url) = settings.rate_limit.store_url.as_deref() else {
            info!(strategy = "local", "Rate limiter ready");
            return Ok(Arc::new(LocalRateLimiter::new(policy)));
        };

        let limiter = SharedRateLimiter::connect_lazy(url, policy)
            .map_err(|e| Error::invalid_setting("rate_limit.store_url", e.to_string()))?;
        // An unreachable store at startup is tolerated like one at request time
        if let Err(e) = limiter.ensure_schema().await {
            warn!(
                error = %e,
                "Shared rate-limit store unavailable; admitting requests until it returns"
            );
        }
        info!(strategy = "shared", "Rate limiter ready");
        Ok(Arc::new(limiter))
    }

    /// Local address of the plaintext redirect listener
    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.http_listener.local_addr()?)
    }

    /// Local address of the HTTPS listener
    pub fn https_addr(&self) -> Result<SocketAddr> {
        Ok(self.https_listener.local_addr()?)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn request_logger(&self) -> &Arc<RequestLogger> {
        &self.request_logger
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then stop background work, drain
    /// in-flight requests for the grace period and flush remaining metrics
    #[instrument(skip_all)]
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let http_addr = self.http_addr()?;
        let https_addr = self.https_addr()?;
        let grace = self.settings.shutdown_grace();

        let tasks = vec![
            BackgroundTask::spawn(
                self.metrics.clone(),
                self.settings.metrics.flush_interval_secs.as_duration(),
            ),
            BackgroundTask::spawn(
                Arc::new(RateLimitCleanup::new(self.rate_limiter.clone())),
                self.settings.rate_limit.cleanup_interval_secs.as_duration(),
            ),
        ];

        let handle = axum_server::Handle::new();
        let mut https_task = tokio::spawn(
            axum_server::from_tcp_rustls(self.https_listener, self.tls)
                .handle(handle.clone())
                .serve(
                    self.router
                        .into_make_service_with_connect_info::<SocketAddr>(),
                ),
        );

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let https_port = self.settings.server.port.tls_companion().ok_or_else(|| {
            Error::invalid_setting("server.port", "no companion port for HTTPS")
        })?;
        let redirect = axum::serve(
            self.http_listener,
            redirect_router(self.settings.server.host.clone(), https_port),
        )
        .with_graceful_shutdown(async move {
            // A dropped sender also means stop
            let _ = stop_rx.changed().await;
        });
        let http_task = tokio::spawn(redirect.into_future());

        info!(%http_addr, %https_addr, "Gateway listening");

        let outcome = tokio::select! {
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
            result = &mut https_task => {
                error!("HTTPS listener stopped unexpectedly");
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(Error::Listen { addr: https_addr, source: e }),
                    Err(e) => Err(Error::Io(std::io::Error::other(e))),
                }
            }
        };

        for task in tasks {
            let name = task.name();
            task.shutdown().await;
            info!(task = name, "Background task shut down");
        }

        handle.graceful_shutdown(Some(grace));
        let _ = stop_tx.send(true);
        let drained = tokio::time::timeout(grace + SHUTDOWN_MARGIN, async {
            if !https_task.is_finished() {
                let _ = (&mut https_task).await;
            }
            let _ = http_task.await;
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "In-flight requests did not finish within the grace period"
            );
            https_task.abort();
        }

        let flushed = self.metrics.flush_all().await;
        info!(metrics = flushed.len(), "Final metrics flush complete");

        info!("Gateway stopped");
        outcome
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
