use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::state::{AppState, WsEvent};

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(rename = "type")]
    msg_type: String,
}

#[derive(Debug, Serialize)]
struct WsOutgoing {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request from client: {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    tracing::info!("WebSocket connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();

    let mut rx = state.subscribe();

    // Forward broadcast events to this client
    let send_task = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            let msg = match event {
                WsEvent::Recorded { uuid, action } => WsOutgoing {
                    msg_type: "recording_action".to_string(),
                    uuid: Some(uuid),
                    action: Some(serde_json::to_value(&action).unwrap_or_default()),
                    progress: None,
                    error: None,
                },
                WsEvent::Progress(progress) => WsOutgoing {
                    msg_type: "playback_progress".to_string(),
                    uuid: Some(progress.uuid().to_string()),
                    action: None,
                    progress: Some(serde_json::to_value(&progress).unwrap_or_default()),
                    error: None,
                },
                WsEvent::Error { uuid, error } => WsOutgoing {
                    msg_type: "error".to_string(),
                    uuid: Some(uuid),
                    action: None,
                    progress: None,
                    error: Some(error),
                },
                WsEvent::Pong => WsOutgoing {
                    msg_type: "pong".to_string(),
                    uuid: None,
                    action: None,
                    progress: None,
                    error: None,
                },
            };

            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages (ping/pong)
    let state_clone = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(incoming) = serde_json::from_str::<WsIncoming>(&text) {
                    if incoming.msg_type == "ping" {
                        state_clone.broadcast(WsEvent::Pong);
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    tracing::info!("WebSocket disconnected: {}", client_id);
}
