use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Maximum number of characters of an upstream body kept in an error value.
const BODY_SNIPPET_LEN: usize = 200;

/// Failures produced by the upstream client and the launch selector.
#[derive(Debug, Error)]
pub enum AllureError {
    #[error("token refresh failed{}: {body}", status_suffix(.status))]
    RefreshFailed { status: Option<u16>, body: String },

    #[error("upstream returned status {status}")]
    Upstream { status: u16, body: String },

    #[error("malformed upstream response: {0}")]
    Decode(String),

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream call cancelled")]
    Cancelled,
}

impl AllureError {
    /// Builds an [`AllureError::Upstream`] keeping only a short prefix of the body.
    pub fn upstream(status: u16, body: &str) -> Self {
        AllureError::Upstream {
            status,
            body: snippet(body),
        }
    }

    pub fn refresh_failed(status: Option<u16>, body: &str) -> Self {
        AllureError::RefreshFailed {
            status,
            body: snippet(body),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AllureError::RefreshFailed { .. } => "refresh_failed",
            AllureError::Upstream { .. } => "upstream_failed",
            AllureError::Decode(_) => "decode_failed",
            AllureError::Transport(_) => "transport_failed",
            AllureError::NotFound(_) => "launch_not_found",
            AllureError::Timeout(_) => "upstream_timeout",
            AllureError::Cancelled => "cancelled",
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

pub(crate) fn snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Allure(#[from] AllureError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                msg.clone(),
            ),
            AppError::Allure(AllureError::NotFound(msg)) => {
                tracing::warn!("launch selection failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "not_found_error",
                    "launch_not_found",
                    msg.clone(),
                )
            }
            AppError::Allure(e) => {
                tracing::error!(code = e.code(), "upstream error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream_error",
                    e.code(),
                    e.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
