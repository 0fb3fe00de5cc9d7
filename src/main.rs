use anyhow::Result;
use inference_gateway::config::Settings;
use inference_gateway::{telemetry, Application, Error};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    telemetry::init(&settings.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting inference gateway");

    let app = match Application::build(settings).await {
        Ok(app) => app,
        Err(e) => {
            match &e {
                Error::AddressInUse { addr } => error!(
                    %addr,
                    "Port already in use; stop the other process or change server.port"
                ),
                Error::Tls(tls) => error!(
                    error = %tls,
                    "No usable TLS certificate; refusing to serve without one"
                ),
                other => error!(error = %other, "Gateway failed to start"),
            }
            return Err(e.into());
        }
    };

    app.run().await?;
    Ok(())
}
