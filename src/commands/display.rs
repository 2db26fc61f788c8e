use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::coordinator::ObserverClient;

/// Print every event line the server broadcasts until it closes the connection
pub async fn display(address: SocketAddr) -> Result<()> {
    let mut client = ObserverClient::connect(address)
        .await
        .with_context(|| format!("Failed to connect to {address}"))?;

    tracing::info!(server = %address, "display connected");

    while let Some(line) = client.next_line().await? {
        println!("{line}");
    }

    tracing::info!("server closed the display connection");
    Ok(())
}
