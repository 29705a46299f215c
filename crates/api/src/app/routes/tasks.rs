use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use genflow_engine::batch_count;

use crate::app::services::{self, AppServices};
use crate::app::{dto, errors};

/// POST /tasks
pub async fn submit_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SubmitBatchRequest>,
) -> axum::response::Response {
    let total_items = body.items.len();
    let scheduler = services.scheduler();

    match scheduler.submit_batch(body.items) {
        Ok(task_id) => (
            StatusCode::CREATED,
            Json(dto::SubmitBatchResponse {
                task_id,
                total_items,
                total_batches: batch_count(total_items, scheduler.config().batch_size),
            }),
        )
            .into_response(),
        Err(e) => errors::submit_error_to_response(e),
    }
}

/// GET /tasks/:id
pub async fn get_progress(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match errors::parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.scheduler().progress(task_id) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// POST /tasks/:id/pause
///
/// Takes effect at the next batch boundary; the returned snapshot reports
/// `paused: true` with status `running` until the current batch drains.
pub async fn pause(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match errors::parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.scheduler().pause(task_id) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// POST /tasks/:id/resume
pub async fn resume(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match errors::parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.scheduler().resume(task_id) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}

/// GET /tasks/:id/stream
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match errors::parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services::task_sse_stream(services, task_id) {
        Ok(sse) => sse.into_response(),
        Err(e) => errors::registry_error_to_response(e),
    }
}
