//! Lease Manager: per-worker candidate selection, lease acquisition,
//! and renewal (spec §4.6, capability C5).

pub mod candidate;
pub mod error;
pub mod manager;

pub use candidate::select_candidate;
pub use error::LeaseManagerError;
pub use manager::{LeaseEvent, LeaseManager, LeaseManagerConfig};
