use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::browser::cdp::CdpPage;
use crate::browser::driver::DynPage;
use crate::challenge::ChallengeMonitor;
use crate::error::AppError;
use crate::models::requests::{StartRecordingRequest, StopRecordingParams};
use crate::models::responses::{
    RecordingStatusResponse, SessionResponse, StopRecordingResponse,
};
use crate::models::script::Script;
use crate::recording::{Recorder, RecorderConfig};

use super::super::state::{ActiveRecording, AppState, WsEvent};
use super::launch_options;

const CHALLENGE_POLL: Duration = Duration::from_millis(500);

/// Starts a recording session: launches a browser at the requested URL and
/// begins turning what the user does there into actions.
///
/// A session already running is superseded; one recording browser at a
/// time. Passing a stored script's uuid resumes that script, so new actions
/// continue its index sequence.
pub async fn start_recording(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRecordingRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if request.url.trim().is_empty() {
        return Err(AppError::Validation("url must not be empty".to_string()));
    }

    let _launch_guard = state.launch_lock.lock().await;

    // Supersede whatever is still running; two capture browsers would
    // double every action.
    for uuid in state.recordings.ids() {
        if let Some(active) = state.recordings.remove(&uuid) {
            tracing::warn!(uuid, "superseding active recording session");
            let _ = active.recorder.stop().await;
            active.teardown().await;
        }
    }

    let script = match &request.uuid {
        Some(uuid) => state
            .store
            .load(uuid)
            .map_err(|e| AppError::Store(e.to_string()))?
            .ok_or_else(|| AppError::ScriptNotFound(uuid.clone()))?,
        None => Script::with_fresh_uuid(&request.url),
    };
    let uuid = script.uuid.clone();

    let options = launch_options(&state.config, &request.url, request.headless, request.viewport);
    let page: DynPage = CdpPage::launch(&options).await?;

    let monitor = ChallengeMonitor::new(CHALLENGE_POLL);
    let recorder = Arc::new(Recorder::new(monitor.flags(), RecorderConfig::default()));
    recorder.start(script).await;
    let monitor_task = monitor.spawn(page.clone());

    // Subscribe before attaching so the first action cannot slip past.
    let mut actions = recorder.subscribe();
    let events = page.start_capture().await?;
    recorder.attach(events).await?;

    // Fan recorded actions out to WebSocket clients and persist the script
    // incrementally, so a crash mid-recording loses nothing.
    let ws = state.ws_broadcast.clone();
    let store = state.store.clone();
    let snapshot_source = recorder.clone();
    let session_uuid = uuid.clone();
    tokio::spawn(async move {
        while let Ok(action) = actions.recv().await {
            let _ = ws.send(WsEvent::Recorded {
                uuid: session_uuid.clone(),
                action,
            });
            if let Some(snapshot) = snapshot_source.script_snapshot().await {
                if let Err(e) = store.save(&snapshot) {
                    tracing::warn!(uuid = %session_uuid, error = %e, "incremental save failed");
                }
            }
        }
    });

    let active = ActiveRecording {
        page: page.clone(),
        recorder,
        monitor,
        monitor_task: Mutex::new(Some(monitor_task)),
    };
    if let Err(e) = state.recordings.create(uuid.clone(), active) {
        page.close().await;
        return Err(e);
    }

    tracing::info!(uuid, url = %request.url, "recording session started");
    Ok(Json(SessionResponse {
        uuid,
        message: "recording".to_string(),
    }))
}

/// Stops a recording, optionally compacts keystroke bursts, and saves the
/// final script.
pub async fn stop_recording(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Query(params): Query<StopRecordingParams>,
) -> Result<Json<StopRecordingResponse>, AppError> {
    let active = state
        .recordings
        .remove(&uuid)
        .ok_or_else(|| AppError::SessionNotFound(uuid.clone()))?;

    let script = active.recorder.stop().await;
    active.teardown().await;

    let script = script.ok_or_else(|| AppError::Internal(anyhow!("session had no script")))?;
    let script = if params.compact {
        script.compacted()
    } else {
        script
    };

    state
        .store
        .save(&script)
        .map_err(|e| AppError::Store(e.to_string()))?;

    tracing::info!(
        uuid = %script.uuid,
        actions = script.actions.len(),
        compacted = params.compact,
        "recording session stopped"
    );

    Ok(Json(StopRecordingResponse {
        uuid: script.uuid.clone(),
        action_count: script.actions.len() as u32,
        compacted: params.compact,
    }))
}

pub async fn pause_recording(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<RecordingStatusResponse>, AppError> {
    let active = state
        .recordings
        .get(&uuid)
        .ok_or_else(|| AppError::SessionNotFound(uuid.clone()))?;

    let recording_state = active.recorder.pause().await;
    Ok(Json(RecordingStatusResponse {
        action_count: recording_state.next_index,
        state: recording_state,
    }))
}

pub async fn resume_recording(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<RecordingStatusResponse>, AppError> {
    let active = state
        .recordings
        .get(&uuid)
        .ok_or_else(|| AppError::SessionNotFound(uuid.clone()))?;

    let recording_state = active.recorder.resume().await;
    Ok(Json(RecordingStatusResponse {
        action_count: recording_state.next_index,
        state: recording_state,
    }))
}

pub async fn recording_status(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<RecordingStatusResponse>, AppError> {
    let active = state
        .recordings
        .get(&uuid)
        .ok_or_else(|| AppError::SessionNotFound(uuid.clone()))?;

    let recording_state = active.recorder.state().await;
    Ok(Json(RecordingStatusResponse {
        action_count: recording_state.next_index,
        state: recording_state,
    }))
}
