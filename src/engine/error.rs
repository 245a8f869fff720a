use ulid::Ulid;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid window: {0}")]
    InvalidWindow(&'static str),
    #[error("scheduling conflict with appointment: {0}")]
    SchedulingConflict(Ulid),
    #[error("product not found: {0}")]
    ProductNotFound(Ulid),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("a product named {0:?} already exists")]
    DuplicateName(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("operation aborted: runtime shutting down")]
    Aborted,
    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Storage(other),
        }
    }
}
