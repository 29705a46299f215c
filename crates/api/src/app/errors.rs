use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use genflow_core::TaskId;
use genflow_engine::{RegistryError, SubmitError};

pub fn registry_error_to_response(err: RegistryError) -> axum::response::Response {
    match err {
        RegistryError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        RegistryError::Finished(_) => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
    }
}

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_task_id(s: &str) -> Result<TaskId, axum::response::Response> {
    s.parse::<TaskId>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_task_id", e.to_string()))
}
