use genflow_core::TaskId;

/// Registry lookup/state error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task already finished: {0}")]
    Finished(TaskId),
}

/// Synchronous rejection of a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("batch must contain at least one item")]
    Empty,
    #[error("item {index} is invalid: {reason}")]
    InvalidItem { index: usize, reason: String },
}
