pub mod display;
pub mod gardener;
pub mod serve;

// Re-export command functions for convenience
pub use display::display;
pub use gardener::{gardener, GardenerParams, GardenerReport};
pub use serve::{serve, ServeParams};
