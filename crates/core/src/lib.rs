//! `genflow-core` — shared building blocks for the generation pipeline.
//!
//! This crate contains **pure** primitives (no network or storage concerns):
//! identifiers, the task/item data model, progress snapshots and the retry
//! combinator every outbound component shares.

pub mod error;
pub mod id;
pub mod model;
pub mod progress;
pub mod retry;

pub use error::{DomainError, DomainResult};
pub use id::{ItemId, TaskId};
pub use model::{
    ArtifactCategory, ArtifactRef, AspectRatio, GenerationItem, GenerationRequest, OutputFormat,
    ProviderKind,
};
pub use progress::{
    ItemError, ItemErrorKind, ItemProgress, ItemStatus, TaskProgress, TaskStatus,
};
pub use retry::{Classify, ErrorClass, RetryPolicy, with_retry};
