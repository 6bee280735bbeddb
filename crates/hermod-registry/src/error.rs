//! Registry error taxonomy (spec §4.7, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("store error: {0}")]
    Store(#[from] hermod_store::StoreError),

    #[error("runtime error: {0}")]
    Runtime(#[from] hermod_runtime::RuntimeError),

    #[error("no workflow instance running for `{0}`")]
    NotRunning(uuid::Uuid),

    #[error("connector resolution failed for workflow `{0}`: {1}")]
    ResolutionFailed(uuid::Uuid, String),
}
