use hermod_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LeaseManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid lease manager config: {0}")]
    InvalidConfig(String),
}
