use serde::Serialize;

use crate::models::session::{PlaybackState, RecordingState};
use crate::store::ScriptSummary;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub uuid: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatusResponse {
    #[serde(flatten)]
    pub state: RecordingState,
    pub action_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecordingResponse {
    pub uuid: String,
    pub action_count: u32,
    pub compacted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatusResponse {
    #[serde(flatten)]
    pub state: PlaybackState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptListResponse {
    pub scripts: Vec<ScriptSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub active_recordings: usize,
    pub active_playbacks: usize,
}
