//! Per-daemon control routes.

use super::reject;
use crate::daemon::DaemonState;
use crate::daemon_status::DaemonStatus;
use crate::error::DaemonError;
use crate::supervisor::SUPERVISOR;
use axum::Json;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;

#[derive(Debug, serde::Serialize)]
pub struct DaemonEntry {
    pub name: String,
    pub directory: String,
    pub main_file: String,
    pub arguments: Vec<String>,
    pub auto_restart: bool,
    pub virtualenv: bool,
    pub status: DaemonStatus,
    #[serde(flatten)]
    pub state: DaemonState,
}

#[derive(Debug, serde::Serialize)]
pub struct DaemonList {
    pub daemons: Vec<DaemonEntry>,
    pub count: usize,
    pub timestamp: f64,
}

pub async fn list() -> Response {
    let mut daemons = vec![];
    for (name, daemon) in SUPERVISOR.daemons().await {
        let mut daemon = daemon.lock().await;
        let state = daemon.state();
        daemons.push(DaemonEntry {
            name,
            directory: daemon.config.project_folder.display().to_string(),
            main_file: daemon.config.main_file.display().to_string(),
            arguments: daemon.config.main_file_arguments.clone(),
            auto_restart: daemon.config.keep_running,
            virtualenv: daemon.config.create_env,
            status: daemon.status(),
            state,
        });
    }
    Json(DaemonList {
        count: daemons.len(),
        daemons,
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
    })
    .into_response()
}

fn operation_failed(action: &str, err: miette::Report) -> Response {
    if let Some(DaemonError::NotFound { .. }) = err.downcast_ref::<DaemonError>() {
        return reject(StatusCode::NOT_FOUND, "Daemon not found");
    }
    reject(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Failed to {action} daemon: {err}"),
    )
}

pub async fn start(Path(name): Path<String>) -> Response {
    match SUPERVISOR.start_daemon(&name).await {
        Ok(()) => Json(json!({ "success": true, "message": "Daemon started" })).into_response(),
        Err(err) => operation_failed("start", err),
    }
}

pub async fn stop(Path(name): Path<String>) -> Response {
    match SUPERVISOR.stop_daemon(&name).await {
        Ok(()) => Json(json!({ "success": true, "message": "Daemon stopped" })).into_response(),
        Err(err) => operation_failed("stop", err),
    }
}

pub async fn restart(Path(name): Path<String>) -> Response {
    match SUPERVISOR.restart_daemon(&name).await {
        Ok(()) => Json(json!({ "success": true, "message": "Daemon restarted" })).into_response(),
        Err(err) => match err.downcast_ref::<DaemonError>() {
            Some(DaemonError::NotFound { .. }) => reject(StatusCode::NOT_FOUND, "Daemon not found"),
            _ => Json(json!({ "success": false, "message": format!("{err}") })).into_response(),
        },
    }
}
