//! Per-worker supervisor: reconciles held leases against running
//! workflow instances (spec §4.7, capability C8).

pub mod error;
pub mod registry;
pub mod resolver;

pub use error::RegistryError;
pub use registry::{Registry, RegistryConfig};
pub use resolver::ConnectorResolver;
