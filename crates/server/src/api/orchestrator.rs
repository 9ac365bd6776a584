//! Orchestrator API handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use reelforge_core::{OrchestratorStatus, RecoveryReport};

use crate::state::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct OrchestratorErrorResponse {
    pub error: String,
}

/// Get orchestrator status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator().status().await)
}

/// Run a recovery sweep now.
pub async fn recover(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecoveryReport>, impl IntoResponse> {
    match state.orchestrator().recover().await {
        Ok(report) => Ok(Json(report)),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(OrchestratorErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
