use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers::{health, recording, replay, scripts};
use super::state::AppState;
use super::websocket::ws_handler;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Local tooling only; the engine drives a real browser session and has
    // no business being reachable from elsewhere.
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:1420".parse::<HeaderValue>().unwrap(),
            "http://localhost:5173".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:1420".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:5173".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Recording endpoints
        .route("/recording/start", post(recording::start_recording))
        .route("/recording/:uuid/stop", post(recording::stop_recording))
        .route("/recording/:uuid/pause", post(recording::pause_recording))
        .route("/recording/:uuid/resume", post(recording::resume_recording))
        .route("/recording/:uuid/status", get(recording::recording_status))
        // Replay endpoints
        .route("/replay/start", post(replay::start_playback))
        .route("/replay/:uuid/stop", post(replay::stop_playback))
        .route("/replay/:uuid/status", get(replay::playback_status))
        // Script CRUD
        .route("/scripts", get(scripts::list_scripts))
        .route("/scripts", post(scripts::save_script))
        .route("/scripts/:uuid", get(scripts::get_script))
        .route("/scripts/:uuid", delete(scripts::delete_script))
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
