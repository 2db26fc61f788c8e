//! Per-unit degradation state
//!
//! Every unit owns its own lock. Operations touch exactly one unit and hold
//! that unit's lock only for a single read-modify-write, so work on
//! different units never contends.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

/// Identifier of a unit, as carried on the wire
pub type UnitId = u64;

/// Errors returned by the unit table
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitError {
    /// Unit index outside `[0, unit_count)`
    #[error("unit {unit} out of range (unit count {count})")]
    OutOfRange { unit: UnitId, count: usize },
}

// ============================================================================
// Unit State Table
// ============================================================================

/// Fixed-size table of `degraded` flags, one lock per unit
#[derive(Debug)]
pub struct UnitStateTable {
    units: Box<[Mutex<bool>]>,
}

impl UnitStateTable {
    /// Create a table with `count` units, all OK
    pub fn new(count: usize) -> Self {
        Self {
            units: (0..count).map(|_| Mutex::new(false)).collect(),
        }
    }

    /// Number of units in the table
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the table has no units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Mark a unit as degraded. Idempotent.
    pub fn set_degraded(&self, unit: UnitId) -> Result<(), UnitError> {
        let mut degraded = self.lock(unit)?;
        *degraded = true;
        Ok(())
    }

    /// Read the unit's flag and clear it in the same critical section.
    ///
    /// Returns the value before clearing, so `true` means the caller has just
    /// taken ownership of repairing this unit.
    pub fn get_and_optionally_clear(&self, unit: UnitId) -> Result<bool, UnitError> {
        let mut degraded = self.lock(unit)?;
        let was_degraded = *degraded;
        if was_degraded {
            *degraded = false;
        }
        Ok(was_degraded)
    }

    /// Read the unit's flag without modifying it
    pub fn is_degraded(&self, unit: UnitId) -> Result<bool, UnitError> {
        Ok(*self.lock(unit)?)
    }

    /// Count degraded units. Locks one unit at a time, so the result is not a
    /// consistent snapshot under concurrent mutation.
    pub fn degraded_count(&self) -> usize {
        self.units.iter().filter(|slot| *lock_unit(slot)).count()
    }

    fn index(&self, unit: UnitId) -> Result<usize, UnitError> {
        usize::try_from(unit)
            .ok()
            .filter(|&i| i < self.units.len())
            .ok_or(UnitError::OutOfRange {
                unit,
                count: self.units.len(),
            })
    }

    fn lock(&self, unit: UnitId) -> Result<MutexGuard<'_, bool>, UnitError> {
        let index = self.index(unit)?;
        Ok(lock_unit(&self.units[index]))
    }
}

/// A poisoned unit lock still guards a plain bool, which cannot be torn
fn lock_unit(slot: &Mutex<bool>) -> MutexGuard<'_, bool> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Tests
// ============================================================================
