use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;

use crate::coordinator::{ClientError, RepairAgentClient};
use crate::garden::UnitId;

/// Parameters for the `gardener` command
#[derive(Debug, Clone)]
pub struct GardenerParams {
    /// Server address
    pub address: SocketAddr,
    /// Number of units to walk over
    pub unit_count: usize,
    /// Upper bound of the random pause before each poll
    pub max_delay: Duration,
    /// Stop after this many passes over all units; run forever if `None`
    pub rounds: Option<usize>,
}

/// Summary of a gardener run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GardenerReport {
    pub polls: u64,
    pub repaired: u64,
}

/// Walk over every unit repeatedly, repairing the degraded ones.
///
/// Returns when the requested rounds are done or the server closes the
/// connection.
pub async fn gardener(params: GardenerParams) -> Result<GardenerReport> {
    let mut client = RepairAgentClient::connect(params.address)
        .await
        .with_context(|| format!("Failed to connect to {}", params.address))?;

    let id = std::process::id();
    let mut report = GardenerReport::default();
    tracing::info!(gardener = id, server = %params.address, "gardener connected");

    let mut round = 0;
    while params.rounds.map_or(true, |limit| round < limit) {
        for unit in 0..params.unit_count as UnitId {
            let pause = random_pause(params.max_delay);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let repaired = match client.poll(unit).await {
                Ok(repaired) => repaired,
                Err(ClientError::Protocol(e)) if e.is_disconnect() => {
                    tracing::info!(gardener = id, "server closed the connection");
                    return Ok(report);
                }
                Err(e) => return Err(e.into()),
            };

            report.polls += 1;
            if repaired {
                report.repaired += 1;
                println!("Unit {unit} has been restored by gardener {id}");
            }
        }
        round += 1;
    }

    Ok(report)
}

fn random_pause(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}
