//! Record and replay engine for browser UI flows.
//!
//! Recording watches what a user does in a live Chromium page and turns it
//! into an ordered action script; replay drives the same flow back against
//! the page, resolving each target element through a ladder of fallback
//! strategies and pausing for PIN/OTP verification challenges instead of
//! capturing or typing secrets. An axum service exposes session lifecycle,
//! script CRUD and a WebSocket progress stream.

pub mod api;
pub mod browser;
pub mod challenge;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod otp;
pub mod recording;
pub mod replay;
pub mod resolve;
pub mod session;
pub mod store;
