//! Workflow instance error taxonomy (spec §4.4, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("store error: {0}")]
    Store(#[from] hermod_store::StoreError),

    #[error("schema error: {0}")]
    Schema(#[from] hermod_schema::SchemaError),

    #[error("outbox error: {0}")]
    Outbox(#[from] hermod_outbox::OutboxError),

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("no source connector bound for node `{0}`")]
    MissingSource(String),

    #[error("no sink connector bound for node `{0}`")]
    MissingSink(String),

    #[error("no transformer bound for node `{0}`")]
    MissingTransformer(String),

    #[error("no condition bound for node `{0}`")]
    MissingCondition(String),

    #[error("instance shutdown timed out draining in-flight messages")]
    ShutdownTimeout,
}
