//! Coordination server for the shared garden
//!
//! Owns all shared state and arbitrates between four kinds of clients.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             Coordination Server              │
//! │                                              │
//! │  producer-in ──► UnitStateTable ◄── repair   │
//! │      │           (lock per unit)     agents  │
//! │      │                                 │     │
//! │      │                     BoundedFixQueue   │
//! │      │                                 │     │
//! │      ▼                                 ▼     │
//! │  ObserverBroadcast ◄──────────── consumer-out│
//! │  (up to N observers)                         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use garden::coordinator::{CoordinatorConfig, CoordinatorServer};
//!
//! let config = CoordinatorConfig::default();
//! let server = CoordinatorServer::bind(config).await?;
//! server.run().await?;
//! ```

pub mod admission;
pub mod client;
pub mod config;
pub mod handlers;
pub mod observers;
pub mod protocol;
pub mod server;

// Re-export main types
pub use admission::{AdmissionControl, AdmissionError, AdmissionSlot};
pub use client::{ClientError, ConsumerClient, ObserverClient, ProducerClient, RepairAgentClient};
pub use config::CoordinatorConfig;
pub use observers::ObserverBroadcast;
pub use protocol::{ConnectionRole, ProtocolError};
pub use server::{CoordinatorServer, ServerContext, ServerError};
