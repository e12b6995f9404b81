use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::challenge::ChallengeKind;

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Paused,
}

/// Observable state of one recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub uuid: String,
    pub status: RecordingStatus,
    /// Index the next captured action will get.
    pub next_index: u32,
    pub started_at: Option<DateTime<Utc>>,
}

impl RecordingState {
    pub fn idle() -> Self {
        Self {
            uuid: String::new(),
            status: RecordingStatus::Idle,
            next_index: 0,
            started_at: None,
        }
    }

    pub fn start(&mut self, uuid: impl Into<String>, next_index: u32) {
        self.uuid = uuid.into();
        self.status = RecordingStatus::Recording;
        self.next_index = next_index;
        self.started_at = Some(Utc::now());
    }

    pub fn pause(&mut self) {
        if self.status == RecordingStatus::Recording {
            self.status = RecordingStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == RecordingStatus::Paused {
            self.status = RecordingStatus::Recording;
        }
    }

    pub fn finish(&mut self) {
        self.status = RecordingStatus::Idle;
    }

    pub fn is_capturing(&self) -> bool {
        self.status == RecordingStatus::Recording
    }
}

/// Observable state of one playback session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub uuid: String,
    pub playing: bool,
    pub current_index: u32,
    pub total: u32,
    /// Set while playback is blocked on an unresolved challenge; the
    /// operator has to clear it in the live browser.
    pub waiting_on: Option<ChallengeKind>,
    pub started_at: Option<DateTime<Utc>>,
}

impl PlaybackState {
    pub fn idle() -> Self {
        Self {
            uuid: String::new(),
            playing: false,
            current_index: 0,
            total: 0,
            waiting_on: None,
            started_at: None,
        }
    }

    pub fn start(&mut self, uuid: impl Into<String>, resume_index: u32, total: u32) {
        self.uuid = uuid.into();
        self.playing = true;
        self.current_index = resume_index;
        self.total = total;
        self.waiting_on = None;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self) {
        self.playing = false;
        self.waiting_on = None;
    }
}
