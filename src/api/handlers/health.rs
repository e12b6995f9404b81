use axum::{extract::State, Json};
use std::sync::Arc;

use super::super::state::AppState;
use crate::models::responses::HealthResponse;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "recplay".to_string(),
        active_recordings: state.recordings.len(),
        active_playbacks: state.playbacks.len(),
    })
}
