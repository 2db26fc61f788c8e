use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::coordinator::{CoordinatorConfig, CoordinatorServer};

/// Parameters for the `serve` command
#[derive(Debug, Clone, Default)]
pub struct ServeParams {
    /// Bind address, overriding the config
    pub address: Option<IpAddr>,
    /// Bind port, overriding the config
    pub port: Option<u16>,
    /// TOML config file
    pub config: Option<PathBuf>,
}

/// Resolve the effective configuration: file (or defaults), then `GARDEN_*`
/// environment variables, then command-line address and port.
pub fn resolve_config(params: &ServeParams) -> Result<CoordinatorConfig> {
    let config = match &params.config {
        Some(path) => CoordinatorConfig::from_file(path)?,
        None => CoordinatorConfig::default(),
    };

    let mut config = config
        .with_env_overrides()
        .context("Invalid GARDEN_* environment override")?;

    let ip = params.address.unwrap_or(config.bind_address.ip());
    let port = params.port.unwrap_or(config.bind_address.port());
    config.bind_address = SocketAddr::new(ip, port);

    Ok(config)
}

/// Run the coordination server until Ctrl-C
pub async fn serve(params: ServeParams) -> Result<()> {
    let config = resolve_config(&params)?;

    let server = CoordinatorServer::bind(config)
        .await
        .context("Failed to start coordination server")?;

    println!("{}", server.info().display());

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
