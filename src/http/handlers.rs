use super::state::AppState;
use crate::error::CallError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn status_for(err: &CallError) -> StatusCode {
    match err {
        CallError::InvalidState { .. } | CallError::Busy | CallError::Cancelled => {
            StatusCode::CONFLICT
        }
        CallError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// POST /call/start
/// Place the call and report the resulting snapshot
pub async fn start_call(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested");

    match state.controller.start().await {
        Ok(()) => (StatusCode::OK, Json(state.controller.snapshot().await)).into_response(),
        Err(e) => {
            error!("Failed to start call: {}", e);
            (
                status_for(&e),
                Json(ErrorResponse {
                    error: e.user_message(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /call/stop
/// Hang up; idempotent
pub async fn stop_call(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested");
    state.controller.stop().await;
    (StatusCode::OK, Json(state.controller.snapshot().await))
}

/// GET /call/status
pub async fn call_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.snapshot().await))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
