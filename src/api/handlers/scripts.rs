use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::responses::ScriptListResponse;
use crate::models::script::Script;

use super::super::state::AppState;

pub async fn list_scripts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScriptListResponse>, AppError> {
    let scripts = state
        .store
        .list()
        .map_err(|e| AppError::Store(e.to_string()))?;
    Ok(Json(ScriptListResponse { scripts }))
}

pub async fn get_script(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Script>, AppError> {
    state
        .store
        .load(&uuid)
        .map_err(|e| AppError::Store(e.to_string()))?
        .map(Json)
        .ok_or(AppError::ScriptNotFound(uuid))
}

/// Saves a script wholesale; an existing script with the same uuid is
/// replaced. Edited scripts come back through here.
pub async fn save_script(
    State(state): State<Arc<AppState>>,
    Json(script): Json<Script>,
) -> Result<Json<serde_json::Value>, AppError> {
    if script.uuid.is_empty() {
        return Err(AppError::Validation("script uuid must not be empty".to_string()));
    }

    state
        .store
        .save(&script)
        .map_err(|e| AppError::Store(e.to_string()))?;

    tracing::info!(uuid = %script.uuid, actions = script.actions.len(), "script saved");
    Ok(Json(serde_json::json!({ "uuid": script.uuid, "saved": true })))
}

pub async fn delete_script(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state
        .store
        .delete(&uuid)
        .map_err(|e| AppError::Store(e.to_string()))?;
    if !deleted {
        return Err(AppError::ScriptNotFound(uuid));
    }

    tracing::info!(uuid, "script deleted");
    Ok(Json(serde_json::json!({ "uuid": uuid, "deleted": true })))
}
