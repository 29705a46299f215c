//! `genflow-providers`
//!
//! **Responsibility:** talk to external image-generation providers.
//!
//! - [`GenerationClient`] hides the two providers' divergent request shapes,
//!   envelope codes and status vocabularies behind one contract.
//! - [`StatusPoller`] drives a single provider job to a terminal state.
//!
//! Nothing in this crate touches task state; callers decide what to record.

pub mod adapter;
pub mod client;
pub mod error;
pub mod flux;
pub mod gpt4o;
pub mod poller;
pub mod status;

pub use adapter::{ProviderAdapter, RatioPlan};
pub use client::{GenerationApi, GenerationClient, GenerationClientConfig};
pub use error::ProviderError;
pub use flux::FluxKontextAdapter;
pub use gpt4o::Gpt4oAdapter;
pub use poller::{PollOutcome, PollSchedule, PollState, PollerConfig, StatusPoller};
pub use status::{ProviderJob, ProviderStatus};
