//! garden - coordination server for a shared set of units
//!
//! Producers report units as degraded, repair agents poll and fix them, a
//! single consumer drains the resulting fix events in order, and observers
//! watch a live broadcast of everything that happens.
//!
//! # Architecture
//!
//! - [`garden`] - shared state: the per-unit table and the bounded fix queue
//! - [`coordinator`] - wire protocol, admission, observer broadcast, role
//!   handlers, the server itself and typed clients
//! - [`commands`] - bodies of the `serve`, `gardener` and `display` commands
//! - [`error`] - unified error type
//!
//! # Example
//!
//! ```no_run
//! use garden::coordinator::{CoordinatorConfig, CoordinatorServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = CoordinatorServer::bind(CoordinatorConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod coordinator;
pub mod error;
pub mod garden;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::coordinator::{
        ConnectionRole, ConsumerClient, CoordinatorConfig, CoordinatorServer, ObserverClient,
        ProducerClient, RepairAgentClient, ServerContext,
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::garden::{BoundedFixQueue, UnitId, UnitStateTable};
}
