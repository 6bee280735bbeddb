//! Metadata store error type (spec §4.1 "Errors", §4.7).
//!
//! Grounded on `durable::persistence::store::StoreError`: a small
//! thiserror enum with a dedicated not-found variant and a catch-all
//! database variant that preserves the driver's message verbatim.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Returned when a single-row read finds nothing (spec §4.1).
    #[error("not found: {0}")]
    NotFound(Uuid),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn database(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("lease on workflow {0} is held by another owner")]
    NotOwner(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
