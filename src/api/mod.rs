//! HTTP API
//!
//! Thin axum layer over the engine. Handlers translate engine outcomes
//! and errors into status codes; no business logic lives here.

pub mod middleware;
pub mod votes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::error::EngineError;

/// Engine error as an HTTP response. Internal detail stays in the logs;
/// the wire carries a stable machine-readable code.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EngineError::AccountSuspended(_) => (StatusCode::FORBIDDEN, "account_suspended"),
            EngineError::UnknownTarget(_) => (StatusCode::NOT_FOUND, "unknown_target"),
            EngineError::InsufficientBalance { .. } => {
                (StatusCode::CONFLICT, "insufficient_balance")
            }
            EngineError::LedgerConflict { .. } => (StatusCode::CONFLICT, "ledger_conflict"),
            EngineError::LimiterUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "limiter_unavailable")
            }
            EngineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(error = %self.0, code = code, "Request failed");
        }
        (
            status,
            Json(json!({
                "error": code,
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
