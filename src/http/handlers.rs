use super::state::AppState;
use crate::error::RecorderError;
use crate::network::{ConnectivitySignal, NetworkQuality};
use crate::recorder::RecorderStatus;
use crate::segment::{CaptureMode, SegmentDescriptor};
use crate::upload::QueueStats;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct StartRecordingRequest {
    /// Capture mode (default: audio)
    pub mode: Option<CaptureMode>,
}

#[derive(Debug, Serialize)]
pub struct RecordingResponse {
    pub status: RecorderStatus,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadsResponse {
    pub stats: QueueStats,
    pub pending: Vec<SegmentDescriptor>,
    pub dead_letters: Vec<SegmentDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub quality: NetworkQuality,
    pub eligible: bool,
    /// Eligibility flipped with this signal
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn recorder_error_response(e: RecorderError) -> Response {
    match e {
        RecorderError::InvalidTransition { .. } => error_response(StatusCode::CONFLICT, e.to_string()),
        other => {
            error!("Recorder error: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

async fn recording_ok(state: &AppState, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(RecordingResponse {
            status: state.recorder.status().await,
            message: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recording/start
/// Start a new recording session (no-op if one is already active)
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> impl IntoResponse {
    let mode = req.mode.unwrap_or(CaptureMode::Audio);
    info!("Starting {:?} recording", mode);

    if state.recorder.state().is_live() {
        return recording_ok(&state, "Recording already active").await;
    }

    let source = match state.sources.create(mode) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to create capture source: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create capture source: {}", e),
            );
        }
    };

    match state.recorder.start(mode, source).await {
        Ok(session_id) => {
            info!("Recording started: {}", session_id);
            recording_ok(&state, "Recording started").await
        }
        Err(RecorderError::AlreadyActive) => recording_ok(&state, "Recording already active").await,
        Err(e) => recorder_error_response(e),
    }
}

/// POST /recording/pause
pub async fn pause_recording(State(state): State<AppState>) -> impl IntoResponse {
    match state.recorder.pause().await {
        Ok(()) => recording_ok(&state, "Recording paused").await,
        Err(e) => recorder_error_response(e),
    }
}

/// POST /recording/resume
pub async fn resume_recording(State(state): State<AppState>) -> impl IntoResponse {
    match state.recorder.resume().await {
        Ok(()) => recording_ok(&state, "Recording resumed").await,
        Err(e) => recorder_error_response(e),
    }
}

/// POST /recording/stop
/// Stop recording; queued segments keep uploading
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    match state.recorder.stop().await {
        Ok(()) => recording_ok(&state, "Recording stopped").await,
        Err(e) => recorder_error_response(e),
    }
}

/// GET /recording/status
pub async fn get_recording_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.recorder.status().await))
}

/// GET /uploads
pub async fn get_uploads(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(UploadsResponse {
            stats: state.queue.stats().await,
            pending: state.queue.snapshot().await,
            dead_letters: state.queue.dead_letters().await,
        }),
    )
}

/// POST /network
/// Feed a connectivity signal from the platform
pub async fn report_network(
    State(state): State<AppState>,
    Json(signal): Json<ConnectivitySignal>,
) -> impl IntoResponse {
    let changed = state.monitor.update(signal);

    (
        StatusCode::OK,
        Json(NetworkResponse {
            quality: state.monitor.current_quality(),
            eligible: state.monitor.is_upload_eligible(),
            changed,
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
