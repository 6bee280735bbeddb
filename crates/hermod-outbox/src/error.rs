//! Outbox pipeline error taxonomy (spec §4.5, §7).

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("store error: {0}")]
    Store(#[from] hermod_store::StoreError),

    #[error("no sink registered for id {0}")]
    UnknownSink(Uuid),

    #[error("circuit open for sink {0}")]
    CircuitOpen(Uuid),
}
