//! Progress events published by the registry.

use genflow_core::{ItemProgress, TaskId, TaskStatus};
use serde::Serialize;

/// A change observed on a task. Subscribers filter by [`ProgressEvent::task_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// An item's progress changed.
    Item { task_id: TaskId, item: ItemProgress },
    /// A batch is about to start.
    Batch {
        task_id: TaskId,
        batch_index: usize,
        total_batches: usize,
    },
    /// Task-level status or pause flag changed.
    Task {
        task_id: TaskId,
        status: TaskStatus,
        paused: bool,
        current_batch_index: usize,
    },
}

impl ProgressEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            ProgressEvent::Item { task_id, .. }
            | ProgressEvent::Batch { task_id, .. }
            | ProgressEvent::Task { task_id, .. } => *task_id,
        }
    }

    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Item { .. } => "item",
            ProgressEvent::Batch { .. } => "batch",
            ProgressEvent::Task { .. } => "task",
        }
    }

    /// True for the event that closes a task's stream.
    pub fn is_final(&self) -> bool {
        matches!(self, ProgressEvent::Task { status, .. } if status.is_terminal())
    }
}
