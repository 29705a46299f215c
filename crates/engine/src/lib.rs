//! `genflow-engine`
//!
//! **Responsibility:** run submitted batches to completion.
//!
//! - [`BatchScheduler`] splits a submission into fixed-size batches and runs
//!   each batch's items concurrently, one batch at a time.
//! - [`TaskRegistry`] owns every task's state and publishes [`ProgressEvent`]s.
//! - [`TransferCache`] keeps one stored artifact per provider job.

pub mod batch;
pub mod cache;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod registry;
pub mod scheduler;

pub use batch::{batch_count, batch_range, partition};
pub use cache::TransferCache;
pub use error::{RegistryError, SubmitError};
pub use events::ProgressEvent;
pub use pipeline::ItemPipeline;
pub use registry::{BatchStep, RegistryConfig, TaskRegistry};
pub use scheduler::{BatchScheduler, SchedulerConfig};
