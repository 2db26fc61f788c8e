//! Unified error handling for the garden crate
//!
//! Domain errors stay in their modules; [`Error`] wraps them so connection
//! handlers and the server share one `Result` type, and [`ErrorCategory`]
//! tells the dispatcher how loudly to report each failure.

use std::io;
use thiserror::Error;

pub use crate::coordinator::admission::AdmissionError;
pub use crate::coordinator::config::ConfigError;
pub use crate::coordinator::protocol::ProtocolError;
pub use crate::coordinator::server::ServerError;
pub use crate::garden::{QueueError, UnitError};

/// How a failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or out-of-range input; only that connection is closed
    Protocol,
    /// A capacity or exclusivity limit turned a connection away
    Admission,
    /// Peer closed or reset the connection
    Disconnect,
    /// Startup failure; the process exits
    Setup,
    /// Invalid configuration
    Config,
    /// Shared state refused an operation
    Internal,
}

/// Unified error type for the garden crate
#[derive(Error, Debug)]
pub enum Error {
    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Admission refused
    #[error("Admission refused: {0}")]
    Admission(#[from] AdmissionError),

    /// Fix queue errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Server setup errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Protocol(e) if e.is_disconnect() => ErrorCategory::Disconnect,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Admission(_) => ErrorCategory::Admission,
            Self::Queue(_) => ErrorCategory::Internal,
            Self::Config(_) => ErrorCategory::Config,
            Self::Server(_) => ErrorCategory::Setup,
            Self::Io(_) => ErrorCategory::Disconnect,
        }
    }
}

impl From<UnitError> for Error {
    fn from(err: UnitError) -> Self {
        Self::Protocol(err.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
