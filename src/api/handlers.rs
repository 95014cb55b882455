use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::errors::AppError;
use crate::models::Launch;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NextLaunchParams {
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportRequest {
    #[serde(default)]
    pub launch_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub with_page_numbers: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct GenerateReportResponse {
    pub report_id: i64,
    pub download_link: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadLinkResponse {
    pub download_link: String,
}

// ── Helpers ──────────────────────────────────────────────────

/// Cancellation token tied to the lifetime of the inbound request: when the
/// handler future is dropped (client went away), the guard fires.
fn request_scope() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}

/// Parses the `after` query value as RFC 3339.
///
/// Form decoding turns an unescaped `+` offset into a space, so spaces are
/// read back as `+` first.
pub fn parse_after(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let corrected = raw.trim().replace(' ', "+");
    DateTime::parse_from_rfc3339(&corrected)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            tracing::warn!(value = %corrected, "invalid 'after' timestamp: {}", e);
            AppError::BadRequest(
                "invalid date format, use RFC3339 (e.g. 2025-01-30T22:00:38.625+03:00)".into(),
            )
        })
}

/// Resolves the launch id from the path and body. A zero body id defers to the path.
fn resolve_launch_id(path_id: &str, body_id: i64) -> Result<i64, AppError> {
    let path_id: i64 = path_id
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid launch id in path: '{}'", path_id)))?;

    let launch_id = match body_id {
        0 => path_id,
        id if path_id == 0 || id == path_id => id,
        id => {
            return Err(AppError::BadRequest(format!(
                "launch id mismatch: path {} vs body {}",
                path_id, id
            )))
        }
    };

    if launch_id == 0 {
        return Err(AppError::BadRequest("launch id is required".into()));
    }
    Ok(launch_id)
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /: service banner
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "allure-service is running" }))
}

/// GET /readyz: succeeds once the upstream accepts our API token
pub async fn readiness(State(state): State<Arc<AppState>>) -> Response {
    let (cancel, _guard) = request_scope();
    match state.reports.check_ready(&cancel).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            tracing::warn!("readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable").into_response()
        }
    }
}

/// GET /next-launch?after=<RFC3339>
pub async fn next_launch(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NextLaunchParams>,
) -> Result<Json<Launch>, AppError> {
    let raw = params
        .after
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            tracing::warn!("query parameter 'after' is missing");
            AppError::BadRequest("query parameter 'after' is required (RFC3339)".into())
        })?;
    let after = parse_after(&raw)?;

    let (cancel, _guard) = request_scope();
    let launch = state.reports.next_launch(after, &cancel).await?;
    Ok(Json(launch))
}

/// POST /export/pdf/:id: start PDF generation for a launch
pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<GenerateReportRequest>, JsonRejection>,
) -> Result<Json<GenerateReportResponse>, AppError> {
    let Json(body) = payload.map_err(|e| {
        tracing::warn!("invalid report request body: {}", e);
        AppError::BadRequest("invalid JSON body".into())
    })?;

    let launch_id = resolve_launch_id(&id, body.launch_id)?;
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("launch name is required".into()));
    }
    tracing::debug!(
        launch_id,
        with_page_numbers = body.with_page_numbers,
        "report requested"
    );

    let (cancel, _guard) = request_scope();
    let report = state
        .reports
        .generate_report(launch_id, &body.name, &cancel)
        .await?;

    Ok(Json(GenerateReportResponse {
        report_id: report.id,
        download_link: state.reports.download_link(&report.id.to_string()),
    }))
}

/// GET /export/download/:id: upstream link for a generated report
pub async fn download_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DownloadLinkResponse>, AppError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("report id is required".into()));
    }
    Ok(Json(DownloadLinkResponse {
        download_link: state.reports.download_link(id),
    }))
}

/// GET /export/pdf/download/:id: stream the PDF through to the caller
pub async fn download_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("report id is required".into()));
    }

    let (cancel, _guard) = request_scope();
    let report = state.reports.download_report(id, &cancel).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", report.file_name),
            ),
        ],
        report.content,
    )
        .into_response())
}
