use serde::Deserialize;

use crate::browser::dom::Viewport;
use crate::models::script::Script;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    /// Page the recording starts on.
    pub url: String,
    /// Resume an existing script instead of starting a fresh one.
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecordingParams {
    /// Collapse per-keystroke type actions before saving.
    #[serde(default)]
    pub compact: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlaybackRequest {
    /// Stored script to play. Either this or `script` must be given.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Inline script, for scripts not present in the store.
    #[serde(default)]
    pub script: Option<Script>,
    #[serde(default)]
    pub resume_index: Option<u32>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
}
