/// API Request Handlers
/// Thin adapters from HTTP to the backup actions

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;

use super::AppState;
use crate::core::scripts::ScriptEntry;
use crate::core::{
    ActionResult, BackupArtifact, BackupError, CancellationToken, DumpResult,
};

const DOWNLOAD_CHUNK: usize = 64 * 1024;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

#[derive(Serialize)]
pub struct HealthInfo {
    status: &'static str,
    version: &'static str,
}

fn status_for(error: &BackupError) -> StatusCode {
    match error {
        BackupError::NotFound { .. } | BackupError::UnknownScript(_) => StatusCode::NOT_FOUND,
        BackupError::Busy => StatusCode::CONFLICT,
        BackupError::ToolUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply<T>(error: &BackupError) -> ApiReply<T> {
    (status_for(error), Json(ApiResponse::error(error.to_string())))
}

/// Action results travel as data in both cases so diagnostics reach the caller
fn action_reply(result: ActionResult, status: StatusCode) -> ApiReply<ActionResult> {
    let error = (!result.success).then(|| result.message.clone());
    (
        status,
        Json(ApiResponse {
            success: result.success,
            data: Some(result),
            error,
        }),
    )
}

// ============================================================================
// Health
// ============================================================================

pub async fn health_check() -> Json<ApiResponse<HealthInfo>> {
    Json(ApiResponse::ok(HealthInfo {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Backup Handlers
// ============================================================================

pub async fn list_backups(State(state): State<Arc<AppState>>) -> ApiReply<Vec<BackupArtifact>> {
    match state.manager.list_backups() {
        Ok(artifacts) => (StatusCode::OK, Json(ApiResponse::ok(artifacts))),
        Err(e) => error_reply(&e),
    }
}

pub async fn create_backup(State(state): State<Arc<AppState>>) -> ApiReply<DumpResult> {
    let outcome = state.manager.create_backup(&CancellationToken::new()).await;
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };

    let result = DumpResult::from_outcome(outcome);
    let error = (!result.success).then(|| result.message.clone());
    (
        status,
        Json(ApiResponse {
            success: result.success,
            data: Some(result),
            error,
        }),
    )
}

pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiReply<ActionResult> {
    let outcome = state
        .manager
        .restore_backup(&filename, &CancellationToken::new())
        .await;
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };

    action_reply(ActionResult::from_restore(outcome), status)
}

pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiReply<ActionResult> {
    let outcome = state.manager.delete_backup(&filename).await;
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };

    action_reply(ActionResult::from_delete(outcome), status)
}

pub async fn download_backup(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    let download = match state.manager.open_backup(&filename).await {
        Ok(download) => download,
        Err(e) => return error_reply::<()>(&e).into_response(),
    };

    let length = download.artifact.size_bytes;
    let body = Body::from_stream(futures::stream::try_unfold(download.file, next_chunk));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/sql")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.artifact.filename),
        )
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn next_chunk(
    mut file: tokio::fs::File,
) -> std::io::Result<Option<(Bytes, tokio::fs::File)>> {
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    let read = file.read(&mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    buf.truncate(read);
    Ok(Some((Bytes::from(buf), file)))
}

// ============================================================================
// Maintenance Script Handlers
// ============================================================================

pub async fn list_scripts(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<ScriptEntry>>> {
    Json(ApiResponse::ok(state.scripts.list()))
}

pub async fn run_script(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiReply<ActionResult> {
    match state.scripts.run("api", &name, &CancellationToken::new()).await {
        Ok(out) => action_reply(
            ActionResult::ok(format!("Script '{}' completed", name), Some(out.output)),
            StatusCode::OK,
        ),
        Err(e) => action_reply(ActionResult::failed(&e), status_for(&e)),
    }
}
