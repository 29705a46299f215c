//! Durable artifact storage: path routing and the object-store backend.

mod backend;
mod router;

pub use backend::build_object_store;
pub use router::{RouterConfig, StorageRouter};

/// Storage error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("invalid public base url: {0}")]
    InvalidBaseUrl(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
