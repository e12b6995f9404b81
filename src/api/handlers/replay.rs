use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::browser::cdp::CdpPage;
use crate::browser::driver::DynPage;
use crate::error::AppError;
use crate::models::requests::StartPlaybackRequest;
use crate::models::responses::{PlaybackStatusResponse, SessionResponse};
use crate::models::script::Script;
use crate::replay::{PlaybackOutcome, Player, PlayerConfig};

use super::super::state::{ActivePlayback, AppState, WsEvent, WsProgressSink};
use super::launch_options;

/// Starts playback of a script, either one loaded from the store by uuid
/// or one supplied inline. Returns as soon as the browser is up; progress
/// streams over the WebSocket.
pub async fn start_playback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartPlaybackRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let script = match (request.script, &request.uuid) {
        (Some(script), _) => script,
        (None, Some(uuid)) => state
            .store
            .load(uuid)
            .map_err(|e| AppError::Store(e.to_string()))?
            .ok_or_else(|| AppError::ScriptNotFound(uuid.clone()))?,
        (None, None) => {
            return Err(AppError::Validation(
                "either uuid or script is required".to_string(),
            ))
        }
    };
    if script.uuid.is_empty() {
        return Err(AppError::Validation("script uuid must not be empty".to_string()));
    }
    if script.url.is_empty() {
        return Err(AppError::Validation("script has no starting url".to_string()));
    }

    let uuid = script.uuid.clone();
    let resume_index = request.resume_index.unwrap_or(0);

    let _launch_guard = state.launch_lock.lock().await;

    let options = launch_options(&state.config, &script.url, request.headless, request.viewport);
    let page: DynPage = CdpPage::launch(&options).await?;

    let config = PlayerConfig {
        otp_lookup_timeout: state.config.otp_lookup_timeout,
        otp_search_terms: state.config.otp_search_terms.clone(),
        ..PlayerConfig::default()
    };
    let sink = Arc::new(WsProgressSink::new(state.ws_broadcast.clone()));
    let player = Arc::new(Player::new(page.clone(), sink, state.otp.clone(), config));

    let active = ActivePlayback {
        page: page.clone(),
        player: player.clone(),
    };
    if let Err(e) = state.playbacks.create(uuid.clone(), active) {
        page.close().await;
        return Err(e);
    }

    tracing::info!(uuid, resume_index, actions = script.actions.len(), "playback session started");

    let host_state = state.clone();
    tokio::spawn(run_playback(host_state, Arc::new(script), resume_index, player));

    Ok(Json(SessionResponse {
        uuid,
        message: "playback started".to_string(),
    }))
}

/// Drives one playback session to its end.
///
/// `Player::run` hands control back whenever a navigation replaces the
/// document; this loop re-enters it with the resume index until the run
/// completes, stops or aborts, then tears the session down.
async fn run_playback(
    state: Arc<AppState>,
    script: Arc<Script>,
    mut resume_index: u32,
    player: Arc<Player>,
) {
    let uuid = script.uuid.clone();
    loop {
        match player.run(script.clone(), resume_index).await {
            Ok(PlaybackOutcome::Interrupted { resume_index: next }) => {
                tracing::debug!(uuid, resume_index = next, "re-entering playback after navigation");
                resume_index = next;
            }
            Ok(outcome) => {
                tracing::info!(uuid, outcome = outcome.as_str(), "playback session ended");
                break;
            }
            Err(err) => {
                tracing::error!(uuid, error = %err, "playback session aborted");
                state.broadcast(WsEvent::Error {
                    uuid: uuid.clone(),
                    error: err.to_string(),
                });
                break;
            }
        }
    }

    if let Some(active) = state.playbacks.remove(&uuid) {
        active.page.close().await;
    }
}

/// Requests a stop. The in-flight action finishes; the host loop cleans up.
pub async fn stop_playback(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let active = state
        .playbacks
        .get(&uuid)
        .ok_or_else(|| AppError::SessionNotFound(uuid.clone()))?;

    active.player.stop();
    Ok(Json(SessionResponse {
        uuid,
        message: "stop requested".to_string(),
    }))
}

pub async fn playback_status(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<PlaybackStatusResponse>, AppError> {
    let active = state
        .playbacks
        .get(&uuid)
        .ok_or_else(|| AppError::SessionNotFound(uuid.clone()))?;

    Ok(Json(PlaybackStatusResponse {
        state: active.player.state().await,
    }))
}
