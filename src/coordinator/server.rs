//! Coordination server
//!
//! [`ServerContext`] owns all shared state and is handed to every connection
//! task. [`CoordinatorServer`] accepts connections and spawns one task per
//! connection; the accept loop never waits on a handler.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, ErrorCategory, Result};
use crate::garden::{BoundedFixQueue, UnitStateTable};

use super::admission::{AdmissionControl, AdmissionError};
use super::config::{ConfigError, CoordinatorConfig};
use super::handlers;
use super::observers::ObserverBroadcast;
use super::protocol::{self, ConnectionRole};

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ============================================================================
// Server Context
// ============================================================================

/// Shared state, constructed once and shared by every connection
#[derive(Debug)]
pub struct ServerContext {
    /// Configuration the context was sized from
    pub config: CoordinatorConfig,

    /// Per-unit degradation flags
    pub units: UnitStateTable,

    /// Repaired units waiting for the consumer
    pub queue: BoundedFixQueue,

    /// Connected observers
    pub observers: ObserverBroadcast,

    /// Producer-in and consumer-out slots
    pub admission: AdmissionControl,
}

impl ServerContext {
    /// Build the shared state from a validated config
    pub fn new(config: CoordinatorConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            units: UnitStateTable::new(config.unit_count),
            queue: BoundedFixQueue::new(config.queue_capacity),
            observers: ObserverBroadcast::new(config.observer_capacity),
            admission: AdmissionControl::new(),
            config,
        })
    }
}

// ============================================================================
// Connection Dispatch
// ============================================================================

/// Read the role tag, apply admission rules and run the role's handler.
///
/// Admission slots are scoped to this call, so they are released on every
/// exit path.
pub async fn dispatch(
    ctx: Arc<ServerContext>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let role = protocol::read_role(&mut stream).await?;
    tracing::debug!(%peer, %role, "role received");

    match role {
        ConnectionRole::ProducerIn => {
            let _slot = ctx.admission.admit_producer()?;
            ctx.observers.publish("connected producer-in");
            handlers::producer_in(&ctx, &mut stream, peer).await
        }
        ConnectionRole::ConsumerOut => {
            let _slot = ctx.admission.admit_consumer()?;
            ctx.observers.publish("connected consumer-out");
            handlers::consumer_out(&ctx, &mut stream, peer).await
        }
        ConnectionRole::RepairAgent => {
            ctx.observers.publish("connected repair-agent");
            handlers::repair_agent(&ctx, &mut stream, peer).await
        }
        ConnectionRole::Observer => {
            ctx.observers.publish("connecting observer");
            if ctx.observers.register(stream, peer) {
                Ok(())
            } else {
                Err(AdmissionError::ObserversFull(ctx.observers.capacity()).into())
            }
        }
    }
}

fn log_outcome(peer: SocketAddr, outcome: Result<()>) {
    let Err(e) = outcome else {
        tracing::debug!(%peer, "connection finished");
        return;
    };

    match e.category() {
        ErrorCategory::Disconnect => tracing::debug!(%peer, error = %e, "peer disconnected"),
        ErrorCategory::Admission => tracing::info!(%peer, error = %e, "connection rejected"),
        ErrorCategory::Internal => tracing::error!(%peer, error = %e, "shared state failure"),
        _ => tracing::warn!(%peer, error = %e, "connection closed"),
    }
}

// ============================================================================
// Coordinator Server
// ============================================================================

/// Listening coordination server
pub struct CoordinatorServer {
    context: Arc<ServerContext>,
    listener: TcpListener,
}

impl CoordinatorServer {
    /// Build the shared state and bind the listener
    pub async fn bind(config: CoordinatorConfig) -> std::result::Result<Self, ServerError> {
        let addr = config.bind_address;
        let context = Arc::new(ServerContext::new(config)?);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self { context, listener })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::result::Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Shared state handed to connections
    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    /// Accept connections forever
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Connection tasks already running are left to finish on their own.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> std::result::Result<(), ServerError> {
        let addr = self.local_addr()?;
        tracing::info!(
            %addr,
            units = self.context.config.unit_count,
            queue_capacity = self.context.config.queue_capacity,
            observer_capacity = self.context.config.observer_capacity,
            "Coordination server listening"
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Coordination server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        tracing::debug!(%peer, "connection accepted");
        let ctx = Arc::clone(&self.context);
        tokio::spawn(async move {
            log_outcome(peer, dispatch(ctx, stream, peer).await);
        });
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        let config = &self.context.config;
        ServerInfo {
            bind_address: self.listener.local_addr().unwrap_or(config.bind_address),
            unit_count: config.unit_count,
            queue_capacity: config.queue_capacity,
            observer_capacity: config.observer_capacity,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub unit_count: usize,
    pub queue_capacity: usize,
    pub observer_capacity: usize,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Garden Coordination Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Units: {}\n\
             Fix Queue Capacity: {}\n\
             Observer Slots: {}",
            "", self.bind_address, self.unit_count, self.queue_capacity, self.observer_capacity
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server setup errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to bind to address
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Listener address unavailable
    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}
