//! Shared garden state
//!
//! - [`units`] - per-unit degradation flags, one lock per unit
//! - [`queue`] - bounded hand-off of repaired units to the consumer

pub mod queue;
pub mod units;

pub use queue::{BoundedFixQueue, QueueError};
pub use units::{UnitError, UnitId, UnitStateTable};
