//! Infrastructure layer: configuration, object storage, artifact transfer.

pub mod config;
pub mod storage;
pub mod transfer;

pub use config::{AppConfig, ConfigError, StorageBackend};
pub use storage::{RouterConfig, StorageError, StorageRouter, build_object_store};
pub use transfer::{
    ArtifactStore, TransferClient, TransferConfig, TransferError, TransferReport, Transferred,
};
