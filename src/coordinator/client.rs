//! Clients for each connection role
//!
//! Thin typed wrappers over the wire protocol, used by the `gardener` and
//! `display` commands and by the integration tests.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::protocol::{self, ConnectionRole, ProtocolError};
use crate::garden::UnitId;

/// How long to wait for the TCP connection to be established
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server
    #[error("Failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    /// Connection attempt timed out
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol failure on an established connection
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Connect and announce `role`
async fn open(addr: impl ToSocketAddrs, role: ConnectionRole) -> Result<TcpStream, ClientError> {
    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| ClientError::Timeout(CONNECT_TIMEOUT))?
        .map_err(ClientError::Connect)?;
    stream.set_nodelay(true).map_err(ClientError::Connect)?;

    protocol::write_role(&mut stream, role).await?;
    Ok(stream)
}

// ============================================================================
// Producer
// ============================================================================

/// Reports degraded units
#[derive(Debug)]
pub struct ProducerClient {
    stream: TcpStream,
}

impl ProducerClient {
    /// Connect as producer-in
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        Ok(Self {
            stream: open(addr, ConnectionRole::ProducerIn).await?,
        })
    }

    /// Report `unit` as degraded
    pub async fn degrade(&mut self, unit: UnitId) -> Result<(), ClientError> {
        protocol::write_unit(&mut self.stream, unit).await?;
        Ok(())
    }

    /// Underlying connection
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

// ============================================================================
// Repair Agent
// ============================================================================

/// Polls units and repairs degraded ones
#[derive(Debug)]
pub struct RepairAgentClient {
    stream: TcpStream,
}

impl RepairAgentClient {
    /// Connect as a repair agent
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        Ok(Self {
            stream: open(addr, ConnectionRole::RepairAgent).await?,
        })
    }

    /// Poll `unit`. Returns `true` if it was degraded and this poll repaired it.
    pub async fn poll(&mut self, unit: UnitId) -> Result<bool, ClientError> {
        protocol::write_unit(&mut self.stream, unit).await?;
        Ok(protocol::read_poll_reply(&mut self.stream).await?)
    }

    /// Underlying connection
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Receives repaired units in queue order
#[derive(Debug)]
pub struct ConsumerClient {
    stream: TcpStream,
}

impl ConsumerClient {
    /// Connect as consumer-out
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        Ok(Self {
            stream: open(addr, ConnectionRole::ConsumerOut).await?,
        })
    }

    /// Wait for the next fix event. `None` once the server closes the connection.
    pub async fn next_fix(&mut self) -> Result<Option<UnitId>, ClientError> {
        match protocol::read_unit(&mut self.stream).await {
            Ok(unit) => Ok(Some(unit)),
            Err(ProtocolError::Closed) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Underlying connection
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Receives the broadcast event log
#[derive(Debug)]
pub struct ObserverClient {
    reader: BufReader<TcpStream>,
}

impl ObserverClient {
    /// Connect as an observer
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        Ok(Self {
            reader: BufReader::new(open(addr, ConnectionRole::Observer).await?),
        })
    }

    /// Wait for the next event line, without its newline. `None` on close.
    pub async fn next_line(&mut self) -> Result<Option<String>, ClientError> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(ProtocolError::Io)?;

        if read == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(Some(line))
    }
}
