use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::challenge::ChallengeKind;

/// Errors raised while resolving elements and executing actions against a page.
///
/// The player inspects these variants to decide whether a step failure is
/// tolerated, whether the run must be re-entered after a navigation, or
/// whether the whole run has to stop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no element found for selector '{selector}' after {timeout:?}")]
    ElementNotFound { selector: String, timeout: Duration },

    #[error("element kind mismatch: expected {expected}, found <{found}>")]
    ElementKindMismatch {
        expected: &'static str,
        found: String,
    },

    /// A verification challenge surfaced mid-execution and swallowed the
    /// element the action was aimed at.
    #[error("{0} challenge appeared during execution")]
    ChallengeInterrupt(ChallengeKind),

    #[error("challenge could not be resolved automatically: {0}")]
    ChallengeUnresolved(String),

    /// The page started navigating and tore down the execution context.
    /// Expected during replay of multi-page flows; the host re-attaches and
    /// resumes from the next action.
    #[error("execution context destroyed by navigation")]
    NavigationInterrupted,

    #[error("operation cancelled")]
    Cancelled,

    /// Failure of the playback loop machinery itself, as opposed to a
    /// single action going wrong. Aborts the run.
    #[error("playback loop failure: {0}")]
    CriticalLoopFailure(String),

    #[error("page driver error: {0}")]
    Driver(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced through the HTTP API.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already active: {0}")]
    SessionConflict(String),

    #[error("script not found: {0}")]
    ScriptNotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::SessionNotFound(_) | AppError::ScriptNotFound(_) => {
                (StatusCode::NOT_FOUND, "Not found")
            }
            AppError::SessionConflict(_) => (StatusCode::CONFLICT, "Session conflict"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Store error"),
            AppError::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Engine error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        };

        let body = Json(json!({
            "error": message,
            "detail": self.to_string(),
        }));

        (status, body).into_response()
    }
}
