//! Global control routes.

use super::system_not_running;
use crate::supervisor::SUPERVISOR;
use axum::Json;
use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub async fn start() -> Response {
    if SUPERVISOR.is_running() {
        return Json(json!({ "success": false, "msg": "System is already running" }))
            .into_response();
    }
    let (success, msg) = SUPERVISOR.start().await;
    Json(json!({ "success": success, "msg": msg })).into_response()
}

pub async fn stop() -> Response {
    if !SUPERVISOR.is_running() {
        return system_not_running();
    }
    let (success, msg) = SUPERVISOR.stop().await;
    Json(json!({ "success": success, "msg": msg })).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct RestartQuery {
    #[serde(default)]
    delay_sec: u64,
}

pub async fn restart(Query(query): Query<RestartQuery>) -> Response {
    if !SUPERVISOR.is_running() {
        return system_not_running();
    }
    let (success, msg) = SUPERVISOR.restart(Duration::from_secs(query.delay_sec)).await;
    Json(json!({ "success": success, "msg": msg })).into_response()
}
