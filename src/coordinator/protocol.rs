//! Wire protocol
//!
//! Every connection opens with a 4-byte little-endian role tag. After that
//! all records are fixed size with no delimiters:
//!
//! | Direction                  | Record              | Size |
//! |----------------------------|---------------------|------|
//! | producer-in -> server      | unit index (u64 LE) | 8    |
//! | repair-agent -> server     | unit index (u64 LE) | 8    |
//! | server -> repair-agent     | was degraded (u8)   | 1    |
//! | server -> consumer-out     | unit index (u64 LE) | 8    |
//! | server -> observer         | text line + `\n`    | -    |

use std::fmt;
use std::io::ErrorKind;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::garden::{UnitError, UnitId};

/// Size of the role tag sent on connect
pub const ROLE_TAG_LEN: usize = 4;

/// Size of a unit index record
pub const UNIT_RECORD_LEN: usize = 8;

/// Size of a poll reply record
pub const POLL_REPLY_LEN: usize = 1;

// ============================================================================
// Connection Role
// ============================================================================

/// Role a client declares when it connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// Reports units going degraded
    ProducerIn,
    /// Receives repaired units from the fix queue
    ConsumerOut,
    /// Polls units and repairs degraded ones
    RepairAgent,
    /// Receives the broadcast event log
    Observer,
}

impl ConnectionRole {
    /// All roles, in tag order
    pub const ALL: [Self; 4] = [
        Self::ProducerIn,
        Self::ConsumerOut,
        Self::RepairAgent,
        Self::Observer,
    ];

    /// Wire tag for this role
    pub const fn tag(self) -> u32 {
        match self {
            Self::ProducerIn => 1,
            Self::ConsumerOut => 2,
            Self::RepairAgent => 3,
            Self::Observer => 4,
        }
    }

    /// Decode a wire tag
    pub fn from_tag(tag: u32) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|role| role.tag() == tag)
            .ok_or(ProtocolError::UnknownRole(tag))
    }

    /// Short name used in logs and event lines
    pub fn name(self) -> &'static str {
        match self {
            Self::ProducerIn => "producer-in",
            Self::ConsumerOut => "consumer-out",
            Self::RepairAgent => "repair-agent",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Connection-level protocol failures. Each one closes only the offending
/// connection.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Peer closed the connection, possibly mid-record
    #[error("peer closed the connection")]
    Closed,

    /// Role tag not recognised
    #[error("unknown role tag {0}")]
    UnknownRole(u32),

    /// Unit index outside the table
    #[error("unit {unit} out of range (unit count {count})")]
    UnitOutOfRange { unit: UnitId, count: usize },

    /// Poll reply byte was neither 0 nor 1
    #[error("invalid poll reply byte {0}")]
    InvalidReply(u8),

    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this is a normal or abnormal peer disconnect rather than a
    /// malformed message
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl From<UnitError> for ProtocolError {
    fn from(err: UnitError) -> Self {
        match err {
            UnitError::OutOfRange { unit, count } => Self::UnitOutOfRange { unit, count },
        }
    }
}

fn map_read_error(e: std::io::Error) -> ProtocolError {
    if e.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::Closed
    } else {
        ProtocolError::Io(e)
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Read the role tag that opens every connection
pub async fn read_role<R>(reader: &mut R) -> Result<ConnectionRole, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; ROLE_TAG_LEN];
    reader.read_exact(&mut buf).await.map_err(map_read_error)?;
    ConnectionRole::from_tag(u32::from_le_bytes(buf))
}

/// Send the role tag
pub async fn write_role<W>(writer: &mut W, role: ConnectionRole) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&role.tag().to_le_bytes()).await?;
    Ok(())
}

/// Read one unit index record
pub async fn read_unit<R>(reader: &mut R) -> Result<UnitId, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; UNIT_RECORD_LEN];
    reader.read_exact(&mut buf).await.map_err(map_read_error)?;
    Ok(UnitId::from_le_bytes(buf))
}

/// Write one unit index record
pub async fn write_unit<W>(writer: &mut W, unit: UnitId) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&unit.to_le_bytes()).await?;
    Ok(())
}

/// Read a poll reply
pub async fn read_poll_reply<R>(reader: &mut R) -> Result<bool, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; POLL_REPLY_LEN];
    reader.read_exact(&mut buf).await.map_err(map_read_error)?;
    match buf[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::InvalidReply(other)),
    }
}

/// Write a poll reply
pub async fn write_poll_reply<W>(writer: &mut W, was_degraded: bool) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[u8::from(was_degraded)]).await?;
    Ok(())
}
