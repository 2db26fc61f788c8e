//! Single-admission rules for the privileged roles
//!
//! At most one producer-in connection is alive at a time. A consumer-out
//! connection is admitted only while a producer-in is connected and no other
//! consumer-out is. The producer requirement is checked at admission only:
//! a consumer stays connected if the producer later drops.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use super::protocol::ConnectionRole;

/// Reasons a privileged role is turned away
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// The role's single slot is taken
    #[error("{0} already connected")]
    AlreadyConnected(ConnectionRole),

    /// Consumer-out arrived before any producer-in
    #[error("consumer-out requires a connected producer-in")]
    ProducerRequired,

    /// Observer registry is full
    #[error("observer capacity {0} reached")]
    ObserversFull(usize),
}

#[derive(Debug, Default)]
struct Flags {
    producer_in: bool,
    consumer_out: bool,
}

// ============================================================================
// Admission Control
// ============================================================================

/// Admission flags for producer-in and consumer-out
#[derive(Debug, Default)]
pub struct AdmissionControl {
    flags: Mutex<Flags>,
}

impl AdmissionControl {
    /// Create with both slots free
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the producer-in slot
    pub fn admit_producer(&self) -> Result<AdmissionSlot<'_>, AdmissionError> {
        let mut flags = self.lock();
        if flags.producer_in {
            return Err(AdmissionError::AlreadyConnected(ConnectionRole::ProducerIn));
        }
        flags.producer_in = true;
        Ok(AdmissionSlot {
            control: self,
            role: ConnectionRole::ProducerIn,
        })
    }

    /// Claim the consumer-out slot. Requires a connected producer-in.
    pub fn admit_consumer(&self) -> Result<AdmissionSlot<'_>, AdmissionError> {
        let mut flags = self.lock();
        if !flags.producer_in {
            return Err(AdmissionError::ProducerRequired);
        }
        if flags.consumer_out {
            return Err(AdmissionError::AlreadyConnected(ConnectionRole::ConsumerOut));
        }
        flags.consumer_out = true;
        Ok(AdmissionSlot {
            control: self,
            role: ConnectionRole::ConsumerOut,
        })
    }

    /// Whether a producer-in connection currently holds its slot
    pub fn producer_connected(&self) -> bool {
        self.lock().producer_in
    }

    /// Whether a consumer-out connection currently holds its slot
    pub fn consumer_connected(&self) -> bool {
        self.lock().consumer_out
    }

    fn release(&self, role: ConnectionRole) {
        let mut flags = self.lock();
        match role {
            ConnectionRole::ProducerIn => flags.producer_in = false,
            ConnectionRole::ConsumerOut => flags.consumer_out = false,
            ConnectionRole::RepairAgent | ConnectionRole::Observer => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A held admission slot, released when dropped
#[derive(Debug)]
#[must_use = "the slot is released as soon as it is dropped"]
pub struct AdmissionSlot<'a> {
    control: &'a AdmissionControl,
    role: ConnectionRole,
}

impl AdmissionSlot<'_> {
    /// Role this slot admits
    pub fn role(&self) -> ConnectionRole {
        self.role
    }
}

impl Drop for AdmissionSlot<'_> {
    fn drop(&mut self) {
        self.control.release(self.role);
        tracing::debug!(role = %self.role, "admission slot released");
    }
}
