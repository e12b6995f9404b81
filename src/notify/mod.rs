//! Progress events emitted during playback and the sinks that carry them.
//!
//! The player talks to an abstract [`ProgressSink`]; the server wires in a
//! [`BroadcastSink`] feeding the WebSocket fanout, tests substitute their
//! own collectors.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::challenge::ChallengeKind;

/// One step in a playback's visible life, in the wire shape clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    ActionStarted {
        uuid: String,
        index: u32,
        kind: String,
        label: String,
        total: u32,
    },
    #[serde(rename = "completed")]
    ActionCompleted { uuid: String, index: u32 },
    #[serde(rename = "error")]
    ActionFailed {
        uuid: String,
        index: u32,
        error: String,
    },
    /// Playback is blocked on a verification challenge. `manual` is false
    /// while automatic code entry is still being attempted, true once the
    /// operator has to act in the live browser.
    ChallengeRequired {
        uuid: String,
        index: u32,
        challenge: ChallengeKind,
        manual: bool,
    },
    /// Terminal event; emitted exactly once per playback session.
    Finished {
        uuid: String,
        #[serde(rename = "lastIndex")]
        last_index: u32,
        outcome: String,
    },
}

impl ProgressEvent {
    pub fn uuid(&self) -> &str {
        match self {
            ProgressEvent::ActionStarted { uuid, .. }
            | ProgressEvent::ActionCompleted { uuid, .. }
            | ProgressEvent::ActionFailed { uuid, .. }
            | ProgressEvent::ChallengeRequired { uuid, .. }
            | ProgressEvent::Finished { uuid, .. } => uuid,
        }
    }
}

/// Where playback progress goes. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Fans events out over a broadcast channel; lagging or absent receivers
/// are the channel's problem, not the player's.
pub struct BroadcastSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressSink for BroadcastSink {
    fn emit(&self, event: ProgressEvent) {
        // receiver count of zero is routine between page loads
        let _ = self.tx.send(event);
    }
}

/// Discards everything. For headless embedding and tests that only care
/// about outcomes.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, event: ProgressEvent) {
        trace!(?event, "progress event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_to_wire_names() {
        let started = ProgressEvent::ActionStarted {
            uuid: "u1".to_string(),
            index: 3,
            kind: "click".to_string(),
            label: "Sign in".to_string(),
            total: 9,
        };
        let value = serde_json::to_value(&started).unwrap();
        assert_eq!(value["event"], "actionStarted");
        assert_eq!(value["index"], 3);
        assert_eq!(value["total"], 9);

        let failed = ProgressEvent::ActionFailed {
            uuid: "u1".to_string(),
            index: 3,
            error: "element not found".to_string(),
        };
        assert_eq!(serde_json::to_value(&failed).unwrap()["event"], "error");

        let finished = ProgressEvent::Finished {
            uuid: "u1".to_string(),
            last_index: 8,
            outcome: "completed".to_string(),
        };
        let value = serde_json::to_value(&finished).unwrap();
        assert_eq!(value["event"], "finished");
        assert_eq!(value["lastIndex"], 8);
    }

    #[test]
    fn challenge_event_carries_kind_and_mode() {
        let event = ProgressEvent::ChallengeRequired {
            uuid: "u1".to_string(),
            index: 5,
            challenge: ChallengeKind::Otp,
            manual: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "challengeRequired");
        assert_eq!(value["challenge"], "otp");
        assert_eq!(value["manual"], true);
    }

    #[test]
    fn broadcast_sink_reaches_subscribers() {
        let (tx, _) = broadcast::channel(8);
        let sink = BroadcastSink::new(tx);
        let mut rx = sink.subscribe();
        let event = ProgressEvent::ActionCompleted {
            uuid: "u1".to_string(),
            index: 0,
        };
        sink.emit(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);
    }
}
