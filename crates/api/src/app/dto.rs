use serde::{Deserialize, Serialize};

use genflow_core::{GenerationRequest, TaskId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    pub items: Vec<GenerationRequest>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SubmitBatchResponse {
    pub task_id: TaskId,
    pub total_items: usize,
    pub total_batches: usize,
}
