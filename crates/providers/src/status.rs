//! Normalized provider job state.

use chrono::{DateTime, Utc};
use genflow_core::ProviderKind;
use serde::{Deserialize, Serialize};

/// Provider-side job handle. Lives only as long as the poll loop for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderJob {
    pub provider_task_id: String,
    pub provider: ProviderKind,
    pub created_at: DateTime<Utc>,
}

impl ProviderJob {
    pub fn new(provider_task_id: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            provider_task_id: provider_task_id.into(),
            provider,
            created_at: Utc::now(),
        }
    }
}

/// Provider status after adapter normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Still running; `progress` is the provider's own 0-100 estimate when it reports one.
    Processing { progress: Option<u8> },
    Completed { artifact_url: String },
    Failed { reason: String },
}

impl ProviderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProviderStatus::Processing { .. })
    }
}
