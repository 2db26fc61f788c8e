//! Observer broadcast
//!
//! A fixed number of observer slots. Each registered observer gets a small
//! writer task fed through a bounded channel; `publish` only ever does a
//! non-blocking `try_send`, so a slow observer can never stall a producer
//! or repair agent. An observer whose channel is full (stalled) or closed
//! (peer gone) is dropped on the spot.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Target used for the local copy of every published line
pub const EVENT_LOG_TARGET: &str = "garden::events";

/// Lines buffered per observer before it counts as stalled
pub const DEFAULT_OBSERVER_BACKLOG: usize = 64;

struct ObserverSlot {
    peer: SocketAddr,
    lines: mpsc::Sender<Arc<str>>,
    writer: JoinHandle<()>,
}

impl ObserverSlot {
    fn is_alive(&self) -> bool {
        !self.lines.is_closed()
    }

    fn close(self) {
        self.writer.abort();
    }
}

// ============================================================================
// Observer Broadcast
// ============================================================================

/// Registry of up to `capacity` observer connections
pub struct ObserverBroadcast {
    slots: Mutex<Vec<Option<ObserverSlot>>>,
    backlog: usize,
}

impl ObserverBroadcast {
    /// Create an empty registry with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self::with_backlog(capacity, DEFAULT_OBSERVER_BACKLOG)
    }

    /// Create with an explicit per-observer line backlog
    pub fn with_backlog(capacity: usize, backlog: usize) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            backlog: backlog.max(1),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Number of observers that are still connected
    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .flatten()
            .filter(|slot| slot.is_alive())
            .count()
    }

    /// Whether no observer is connected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim a slot for `stream`.
    ///
    /// Returns `false` when every slot is held by a live observer; the stream
    /// is dropped, which closes the connection without sending anything.
    /// Must be called from within a Tokio runtime.
    pub fn register(&self, stream: TcpStream, peer: SocketAddr) -> bool {
        let mut slots = self.lock();

        let Some(index) = slots
            .iter()
            .position(|slot| slot.as_ref().map_or(true, |s| !s.is_alive()))
        else {
            tracing::info!(%peer, "observer rejected: all slots taken");
            return false;
        };

        if let Some(stale) = slots[index].take() {
            stale.close();
        }

        let (lines, rx) = mpsc::channel(self.backlog);
        let writer = tokio::spawn(run_observer(stream, peer, rx));
        slots[index] = Some(ObserverSlot {
            peer,
            lines,
            writer,
        });

        tracing::debug!(%peer, slot = index, "observer registered");
        true
    }

    /// Send `line` to every live observer and to the local event log.
    ///
    /// Never waits on an observer. Observers that cannot take the line right
    /// now are unregistered and closed.
    pub fn publish(&self, line: &str) {
        tracing::info!(target: EVENT_LOG_TARGET, "{line}");

        let message: Arc<str> = Arc::from(format!("{line}\n"));
        let mut slots = self.lock();

        for entry in slots.iter_mut() {
            let Some(slot) = entry.as_ref() else { continue };

            match slot.lines.try_send(Arc::clone(&message)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(peer = %slot.peer, "observer stalled, dropping");
                    if let Some(slot) = entry.take() {
                        slot.close();
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(peer = %slot.peer, "observer gone, pruning");
                    if let Some(slot) = entry.take() {
                        slot.close();
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<ObserverSlot>>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ObserverBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverBroadcast")
            .field("capacity", &self.capacity())
            .field("connected", &self.len())
            .field("backlog", &self.backlog)
            .finish()
    }
}

/// Forward queued lines to one observer until either side goes away.
///
/// Reads from the observer only to notice when it closes; anything it sends
/// is discarded.
async fn run_observer(stream: TcpStream, peer: SocketAddr, mut lines: mpsc::Receiver<Arc<str>>) {
    let (mut reader, mut writer) = stream.into_split();
    let mut probe = [0u8; 64];

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    tracing::debug!(%peer, error = %e, "observer send failed");
                    break;
                }
            }
            read = reader.read(&mut probe) => {
                match read {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "observer probe failed");
                        break;
                    }
                }
            }
        }
    }

    lines.close();
    tracing::debug!(%peer, "observer disconnected");
}
