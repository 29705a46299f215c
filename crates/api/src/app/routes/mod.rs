use axum::{
    Router,
    routing::{get, post},
};

pub mod system;
pub mod tasks;

/// Router for task endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/tasks", post(tasks::submit_batch))
        .route("/tasks/:id", get(tasks::get_progress))
        .route("/tasks/:id/pause", post(tasks::pause))
        .route("/tasks/:id/resume", post(tasks::resume))
        .route("/tasks/:id/stream", get(tasks::stream))
}
