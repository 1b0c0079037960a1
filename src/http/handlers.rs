use super::state::AppState;
use crate::buffer::{BufferStatistics, DisplayItem};
use crate::error::LiveError;
use crate::session::SessionSummary;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub student_id: String,

    /// Topic being tutored (e.g. "quadratic equations")
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub connection: crate::connection::ConnectionSnapshot,
    pub latency_ms: u64,
    pub quality: crate::connection::Quality,
    pub needs_attention: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start a new tutoring session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    info!("starting session for student: {}", req.student_id);

    match state
        .orchestrator
        .start_session(&req.student_id, &req.topic)
        .await
    {
        Ok(session_id) => (
            StatusCode::OK,
            Json(StartSessionResponse {
                session_id,
                status: "active".to_string(),
            }),
        )
            .into_response(),
        Err(LiveError::SessionActive(id)) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("session {} is still active", id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("failed to start session: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed to start session: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /sessions/pause
pub async fn pause_session(State(state): State<AppState>) -> impl IntoResponse {
    if state.orchestrator.pause_session() {
        (
            StatusCode::OK,
            Json(ToggleResponse {
                status: "paused".to_string(),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no active session to pause".to_string(),
            }),
        )
            .into_response()
    }
}

/// POST /sessions/resume
pub async fn resume_session(State(state): State<AppState>) -> impl IntoResponse {
    if state.orchestrator.resume_session() {
        (
            StatusCode::OK,
            Json(ToggleResponse {
                status: "active".to_string(),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no paused session to resume".to_string(),
            }),
        )
            .into_response()
    }
}

/// POST /sessions/end/:session_id
/// Ending an unknown session id is a no-op, reported as `ended: false`
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let summary = state.orchestrator.end_session(&session_id);
    let ended = summary.is_some();
    (StatusCode::OK, Json(EndSessionResponse { ended, summary })).into_response()
}

/// GET /sessions/current
pub async fn current_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.orchestrator.current_summary() {
        Some(summary) => (StatusCode::OK, Json(summary)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no session".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /buffer
/// Full display-buffer snapshot for the display collaborator
pub async fn get_buffer(State(state): State<AppState>) -> Json<Vec<DisplayItem>> {
    Json(state.orchestrator.buffer().get_buffer())
}

/// GET /buffer/stats
pub async fn get_buffer_stats(State(state): State<AppState>) -> Json<BufferStatistics> {
    Json(state.orchestrator.buffer().statistics())
}

/// GET /buffer/export
/// Serialized buffer contents for downstream persistence
pub async fn export_buffer(State(state): State<AppState>) -> impl IntoResponse {
    match state.orchestrator.buffer().export_json() {
        Ok(json) => (StatusCode::OK, json).into_response(),
        Err(e) => {
            error!("buffer export failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("export failed: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /connection
/// Connection state and quality for a connection-quality UI
pub async fn get_connection(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.orchestrator.connection_snapshot();
    let metrics = state.orchestrator.health_metrics();

    let body = ConnectionResponse {
        connection: snapshot,
        latency_ms: metrics.latency.as_millis() as u64,
        quality: metrics.quality,
        needs_attention: state.orchestrator.needs_attention(),
    };

    (StatusCode::OK, Json(body)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
