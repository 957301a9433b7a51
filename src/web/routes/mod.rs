pub mod access;
pub mod daemons;
pub mod hell;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub(crate) fn reject(status: StatusCode, detail: impl ToString) -> Response {
    (status, Json(json!({ "detail": detail.to_string() }))).into_response()
}

pub(crate) fn system_not_running() -> Response {
    reject(StatusCode::NOT_FOUND, "System is not running")
}
