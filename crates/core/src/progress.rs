//! Per-item and per-task progress snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ItemId, TaskId};
use crate::model::ArtifactRef;

/// Item execution status.
///
/// Transitions only move forward: `pending → generating → {completed | error}`
/// or `pending → error`. An errored item is never retried automatically.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Generating,
    Completed,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Error)
    }

    fn can_transition_to(self, next: ItemStatus) -> bool {
        match (self, next) {
            (ItemStatus::Pending, ItemStatus::Generating) => true,
            (ItemStatus::Generating, ItemStatus::Generating) => true,
            (ItemStatus::Pending | ItemStatus::Generating, ItemStatus::Completed) => true,
            (ItemStatus::Pending | ItemStatus::Generating, ItemStatus::Error) => true,
            _ => false,
        }
    }
}

/// Why an item ended in `error`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    /// Auth, quota, malformed parameter or content policy. Never retried.
    Fatal,
    /// The provider reported the job as failed.
    ProviderFailed,
    /// Status polling hit its attempt ceiling; the job may still finish out-of-band.
    TimedOut,
    /// Network failures exhausted the retry budget.
    Network,
    /// Every transport strategy failed to move the artifact into storage.
    TransferExhausted,
}

/// Error detail attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub message: String,
    /// Provider-hosted artifact URL kept as a degraded fallback when the
    /// transfer into durable storage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
}

impl ItemError {
    pub fn new(kind: ItemErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fallback_url: None,
        }
    }

    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }
}

/// Live progress of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub item_id: ItemId,
    pub status: ItemStatus,
    /// 0-100.
    pub progress: u8,
    pub message: String,
    pub artifact: Option<ArtifactRef>,
    pub error: Option<ItemError>,
    pub updated_at: DateTime<Utc>,
}

impl ItemProgress {
    pub fn pending(item_id: ItemId) -> Self {
        Self {
            item_id,
            status: ItemStatus::Pending,
            progress: 0,
            message: "waiting for batch".to_string(),
            artifact: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Record generation progress. Progress never moves backwards and never
    /// reaches 100 before the artifact is stored.
    ///
    /// Returns `false` if the item is already terminal.
    pub fn mark_generating(&mut self, progress: u8, message: impl Into<String>) -> bool {
        if !self.status.can_transition_to(ItemStatus::Generating) {
            return false;
        }
        self.status = ItemStatus::Generating;
        self.progress = self.progress.max(progress.min(99));
        self.message = message.into();
        self.updated_at = Utc::now();
        true
    }

    pub fn mark_completed(&mut self, artifact: ArtifactRef) -> bool {
        if !self.status.can_transition_to(ItemStatus::Completed) {
            return false;
        }
        self.status = ItemStatus::Completed;
        self.progress = 100;
        self.message = "stored".to_string();
        self.artifact = Some(artifact);
        self.updated_at = Utc::now();
        true
    }

    pub fn mark_error(&mut self, error: ItemError) -> bool {
        if !self.status.can_transition_to(ItemStatus::Error) {
            return false;
        }
        self.status = ItemStatus::Error;
        self.message = error.message.clone();
        self.error = Some(error);
        self.updated_at = Utc::now();
        true
    }
}

/// Task lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Paused,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

/// Point-in-time view of a task, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub paused: bool,
    pub total_batches: usize,
    pub current_batch_index: usize,
    pub total_items: usize,
    pub pending: usize,
    pub generating: usize,
    pub completed: usize,
    pub failed: usize,
    pub items: Vec<ItemProgress>,
}

impl TaskProgress {
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactCategory;

    fn artifact() -> ArtifactRef {
        ArtifactRef {
            public_url: "http://cdn/images/generated/a.png".to_string(),
            storage_path: "images/generated/a.png".to_string(),
            category: ArtifactCategory::Generated,
            filename: "a.png".to_string(),
        }
    }

    #[test]
    fn progress_is_monotonic_and_capped_below_100() {
        let mut p = ItemProgress::pending(ItemId::new());
        assert!(p.mark_generating(40, "polling"));
        assert!(p.mark_generating(20, "polling"));
        assert_eq!(p.progress, 40);
        assert!(p.mark_generating(100, "provider done"));
        assert_eq!(p.progress, 99);
    }

    #[test]
    fn completion_sets_100_and_artifact() {
        let mut p = ItemProgress::pending(ItemId::new());
        p.mark_generating(10, "creating");
        assert!(p.mark_completed(artifact()));
        assert_eq!(p.status, ItemStatus::Completed);
        assert_eq!(p.progress, 100);
        assert!(p.artifact.is_some());
    }

    #[test]
    fn terminal_items_do_not_move() {
        let mut p = ItemProgress::pending(ItemId::new());
        assert!(p.mark_error(ItemError::new(ItemErrorKind::Fatal, "quota")));
        assert!(!p.mark_generating(50, "late poll"));
        assert!(!p.mark_completed(artifact()));
        assert_eq!(p.status, ItemStatus::Error);
        assert_eq!(p.error.as_ref().unwrap().kind, ItemErrorKind::Fatal);
    }

    #[test]
    fn fallback_url_is_kept_on_transfer_failure() {
        let err = ItemError::new(ItemErrorKind::TransferExhausted, "all strategies failed")
            .with_fallback_url("https://provider/tmp/a.png");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "transfer_exhausted");
        assert_eq!(json["fallback_url"], "https://provider/tmp/a.png");
    }
}
