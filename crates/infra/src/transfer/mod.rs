//! Resilient "fetch remote bytes, stream to object storage" pipeline.
//!
//! A transfer runs the strategy chain (see [`strategy`]) up to
//! `1 + retry_count` times. Each strategy failure is logged and recorded;
//! only exhausting every cycle surfaces an error, carrying a
//! [`TransferReport`] with the attempted strategies and host diagnostics.

mod client;
mod diagnostics;
mod error;
mod sniff;
pub mod strategy;

use async_trait::async_trait;
use genflow_core::{ArtifactCategory, ArtifactRef};

pub use client::{TransferClient, TransferConfig, Transferred};
pub use diagnostics::{HostDiagnostics, diagnose};
pub use error::{StrategyFailure, TransferError, TransferReport};
pub use sniff::ImageKind;
pub use strategy::{
    FallbackTransport, FetchedBody, FullTransport, SimpleTransport, TransportStrategy,
};

/// Moves an artifact from a remote URL into durable storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    async fn fetch_and_store(
        &self,
        source_url: &str,
        category: ArtifactCategory,
        filename: Option<&str>,
    ) -> Result<ArtifactRef, TransferError>;
}
