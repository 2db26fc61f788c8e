//! Per-connection role handlers
//!
//! Each handler runs on its own task until the peer disconnects or sends
//! something invalid. Unit locks are never held across socket I/O: the
//! table operations complete before any read or write is awaited.

use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use super::protocol::{self, ProtocolError};
use super::server::ServerContext;
use crate::error::Result;
use crate::garden::UnitId;

/// Read the next unit record, mapping a clean close to `None`
async fn next_unit(stream: &mut TcpStream) -> Result<Option<UnitId>> {
    match protocol::read_unit(stream).await {
        Ok(unit) => Ok(Some(unit)),
        Err(ProtocolError::Closed) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Producer-in: mark each reported unit as degraded.
///
/// The caller holds the producer-in admission slot for as long as this runs.
pub async fn producer_in(
    ctx: &ServerContext,
    stream: &mut TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    while let Some(unit) = next_unit(stream).await? {
        ctx.units.set_degraded(unit)?;
        tracing::debug!(%peer, unit, "degrade reported");
        ctx.observers.publish(&format!("unit {unit} degraded"));
    }

    Ok(())
}

/// Repair agent: answer each poll with whether the unit was degraded, and
/// hand every unit it just repaired to the fix queue.
///
/// A unit cleared by a poll is always enqueued, even when the reply could
/// not be delivered, so no fix event is lost. If no consumer is draining the
/// queue, this task stays parked in `push` until one does, including after
/// the agent itself has disconnected.
pub async fn repair_agent(
    ctx: &ServerContext,
    stream: &mut TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    while let Some(unit) = next_unit(stream).await? {
        let was_degraded = ctx.units.get_and_optionally_clear(unit)?;
        let reply = protocol::write_poll_reply(stream, was_degraded).await;

        if was_degraded {
            ctx.queue.push(unit).await?;
            tracing::debug!(%peer, unit, queued = ctx.queue.len(), "unit repaired");
            ctx.observers.publish(&format!("unit {unit} repaired"));
        }

        reply?;
    }

    Ok(())
}

/// Consumer-out: stream fix events from the queue to the consumer.
///
/// Delivery is at most once. A unit popped from the queue whose send fails
/// is logged and dropped; the consumer resynchronises through later
/// degrade and poll traffic. The socket is checked before every pop, so a
/// consumer that has already left never drains queued units into a dead
/// connection, and one that leaves an idle queue releases its slot at once.
pub async fn consumer_out(
    ctx: &ServerContext,
    stream: &mut TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut probe = [0u8; 64];

    loop {
        tokio::select! {
            // EOF first: a pending close must win over queued units
            biased;

            read = reader.read(&mut probe) => {
                match read {
                    Ok(0) => return Ok(()),
                    Ok(n) => tracing::trace!(%peer, bytes = n, "ignoring consumer input"),
                    Err(e) => return Err(ProtocolError::Io(e).into()),
                }
            }
            unit = ctx.queue.pop() => {
                let unit = unit?;
                if let Err(e) = protocol::write_unit(&mut writer, unit).await {
                    tracing::warn!(%peer, unit, error = %e, "consumer gone, fix event dropped");
                    return Err(e.into());
                }
                tracing::debug!(%peer, unit, "fix event delivered");
            }
        }
    }
}
