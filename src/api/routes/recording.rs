//! Recording control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Recording status (GET /status)
//! - Manual start/stop (POST /recording/start, POST /recording/stop)
//! - The record-all-meetings switch (PUT /auto-record)
//! - Opening the recording folder (POST /open-folder)

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{error, info};

use super::{ApiCommand, ApiState};
use crate::api::error::{ApiError, ApiResult};
use crate::recording::{CommandOutcome, ControllerCommand};

#[derive(Debug, Clone, Deserialize)]
pub struct AutoRecordRequest {
    pub enabled: bool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(recording_status))
        .route("/recording/start", post(start_recording))
        .route("/recording/stop", post(stop_recording))
        .route("/auto-record", put(set_auto_record))
        .route("/open-folder", post(open_folder))
        .with_state(state)
}

/// Forward a command to the controller and wait for its answer.
async fn dispatch(state: &ApiState, command: ControllerCommand) -> ApiResult<CommandOutcome> {
    let (reply, outcome) = oneshot::channel();
    state
        .tx
        .send(ApiCommand { command, reply })
        .await
        .map_err(|e| {
            error!("Failed to send {:?} command: {}", command, e);
            ApiError::unavailable("recording controller is not running")
        })?;

    let outcome = outcome
        .await
        .map_err(|_| ApiError::unavailable("recording controller dropped the request"))?;
    Ok(outcome?)
}

async fn recording_status(State(state): State<ApiState>) -> Json<Value> {
    let snapshot = state.recording.get();
    let session = snapshot.session.as_ref();

    Json(json!({
        "recording": snapshot.is_active(),
        "output_path": session.map(|s| s.output_path.to_string_lossy().to_string()),
        "started_at": session.map(|s| s.started_at.to_rfc3339()),
        "duration_seconds": session.map(|s| s.duration_seconds()),
        "auto_record": snapshot.auto_record,
        "connected": state.client.is_connected(),
        "last_error": snapshot.last_error,
        "last_recording": snapshot.last_recording,
    }))
}

async fn start_recording(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Recording start command received via API");

    match dispatch(&state, ControllerCommand::Start).await? {
        CommandOutcome::Started(path) => Ok(Json(json!({
            "success": true,
            "message": "Recording started",
            "output_path": path.to_string_lossy(),
        }))),
        CommandOutcome::AlreadyRecording(path) => Ok(Json(json!({
            "success": true,
            "message": "Already recording",
            "output_path": path.to_string_lossy(),
        }))),
        other => Err(ApiError::internal(format!("unexpected outcome {:?}", other))),
    }
}

async fn stop_recording(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Recording stop command received via API");

    match dispatch(&state, ControllerCommand::Stop).await? {
        CommandOutcome::Stopped(completed) => Ok(Json(json!({
            "success": true,
            "message": "Recording stopped",
            "output_path": completed.as_ref().map(|c| c.output_path.to_string_lossy().to_string()),
            "bytes_written": completed.map(|c| c.bytes_written),
        }))),
        CommandOutcome::NotRecording => Ok(Json(json!({
            "success": true,
            "message": "Not recording",
        }))),
        other => Err(ApiError::internal(format!("unexpected outcome {:?}", other))),
    }
}

async fn set_auto_record(
    State(state): State<ApiState>,
    Json(request): Json<AutoRecordRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = dispatch(&state, ControllerCommand::SetAutoRecord(request.enabled)).await?;
    let enabled = match outcome {
        CommandOutcome::AutoRecord(enabled) => enabled,
        other => return Err(ApiError::internal(format!("unexpected outcome {:?}", other))),
    };

    Ok(Json(json!({
        "success": true,
        "auto_record": enabled,
    })))
}

async fn open_folder(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    match dispatch(&state, ControllerCommand::OpenFolder).await? {
        CommandOutcome::FolderOpened(path) => Ok(Json(json!({
            "success": true,
            "path": path.to_string_lossy(),
        }))),
        other => Err(ApiError::internal(format!("unexpected outcome {:?}", other))),
    }
}
