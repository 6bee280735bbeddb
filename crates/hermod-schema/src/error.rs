//! Schema Registry error taxonomy (spec §4.3, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema failed to parse: {0}")]
    InvalidSchema(String),

    #[error("schema type changed from the previous version of `{0}`")]
    TypeChanged(String),

    #[error("new schema is incompatible with the previous version: {0}")]
    IncompatibleSchema(String),

    #[error("no schema registered under `{0}`")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] hermod_store::StoreError),
}
