//! HTTP service surface: router, handlers, shared state and the WebSocket
//! progress stream.

pub mod handlers;
pub mod routes;
pub mod state;
pub mod websocket;
