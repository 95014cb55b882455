//! Router tests: the full axum app driven in-process against a fake provider.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use allure_service::api;
use allure_service::config::Config;
use allure_service::errors::AllureError;
use allure_service::models::{DownloadedReport, Launch, PdfReport};
use allure_service::service::ReportService;
use allure_service::upstream::{CallContext, ReportProvider};
use allure_service::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;
use tower::ServiceExt;

const LINK_BASE: &str = "https://allure.example.com/api/export/download/";

#[derive(Default)]
struct FakeAllure {
    launches: Vec<Launch>,
    auth_fails: bool,
    list_fails: bool,
    generated: Mutex<Vec<(i64, String)>>,
}

fn upstream_down() -> AllureError {
    AllureError::upstream(502, "bad gateway")
}

#[async_trait]
impl ReportProvider for FakeAllure {
    async fn authenticate(&self, _ctx: &CallContext) -> Result<(), AllureError> {
        if self.auth_fails {
            return Err(AllureError::refresh_failed(Some(401), "bad token"));
        }
        Ok(())
    }

    async fn list_launches(&self, _ctx: &CallContext) -> Result<Vec<Launch>, AllureError> {
        if self.list_fails {
            return Err(upstream_down());
        }
        Ok(self.launches.clone())
    }

    async fn generate_report(
        &self,
        _ctx: &CallContext,
        launch_id: i64,
        launch_name: &str,
    ) -> Result<PdfReport, AllureError> {
        self.generated
            .lock()
            .unwrap()
            .push((launch_id, launch_name.to_string()));
        Ok(PdfReport {
            id: 456,
            project_id: 1661,
            kind: "pdf".into(),
            status: "generated".into(),
            storage_key: String::new(),
            name: launch_name.to_string(),
            created_date: 0,
        })
    }

    fn download_link(&self, report_id: &str) -> String {
        format!("{}{}", LINK_BASE, report_id)
    }

    async fn download_report(
        &self,
        _ctx: &CallContext,
        report_id: &str,
    ) -> Result<DownloadedReport, AllureError> {
        if report_id == "999" {
            return Err(AllureError::upstream(404, "no such report"));
        }
        Ok(DownloadedReport {
            file_name: DownloadedReport::file_name_for(report_id),
            content: Bytes::from_static(b"%PDF-1.7 fake"),
        })
    }
}

fn launch(id: i64, created_date: i64) -> Launch {
    Launch {
        id,
        name: format!("Launch {}", id),
        project_id: 1661,
        created_date,
        last_modified_date: created_date,
    }
}

fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "ALLURE_BASE_URL" => Some("https://allure.example.com".into()),
        "ALLURE_API_URL" => Some("/api/".into()),
        "ALLURE_API_TOKEN" => Some("fake-token".into()),
        "ALLURE_PROJECT_ID" => Some("1661".into()),
        _ => None,
    })
    .expect("test config is complete")
}

fn router(fake: Arc<FakeAllure>) -> axum::Router {
    let reports =
        ReportService::with_timeouts(fake, Duration::from_secs(10), Duration::from_secs(30));
    api::app(Arc::new(AppState {
        config: test_config(),
        reports,
    }))
}

fn default_router() -> (axum::Router, Arc<FakeAllure>) {
    let fake = Arc::new(FakeAllure {
        launches: vec![
            launch(101, 1_706_997_600_000), // 2024-02-03T22:00:00Z
            launch(102, 1_706_918_400_000), // 2024-02-03T00:00:00Z
        ],
        ..Default::default()
    });
    (router(fake.clone()), fake)
}

async fn send(app: axum::Router, req: Request<Body>) -> Response {
    app.oneshot(req).await.unwrap()
}

async fn get(app: axum::Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: axum::Router, uri: &str, body: &str) -> Response {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn body_bytes(resp: Response) -> Bytes {
    axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap()
}

async fn body_json(resp: Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

// ── Liveness / misc ──────────────────────────────────────────

#[tokio::test]
async fn test_root_and_healthz() {
    let (app, _) = default_router();
    let resp = get(app.clone(), "/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "allure-service is running");

    let resp = get(app, "/healthz").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"ok");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = default_router();
    let resp = get(app, "/nope").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let (app, _) = default_router();
    let resp = get(app, "/healthz").await;

    let headers = resp.headers();
    let request_id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["cache-control"], "no-store");
    assert!(headers.get("server").is_none());
}

#[tokio::test]
async fn test_readyz_follows_authentication() {
    let (app, _) = default_router();
    assert_eq!(get(app, "/readyz").await.status(), StatusCode::OK);

    let app = router(Arc::new(FakeAllure {
        auth_fails: true,
        ..Default::default()
    }));
    assert_eq!(
        get(app, "/readyz").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

// ── /next-launch ─────────────────────────────────────────────

#[tokio::test]
async fn test_next_launch_returns_closest_launch() {
    let (app, _) = default_router();
    let resp = get(app, "/next-launch?after=2024-02-02T22:00:00Z").await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["id"], 102);
    assert_eq!(body["name"], "Launch 102");
    assert_eq!(body["createdDate"], 1_706_918_400_000i64);
}

#[tokio::test]
async fn test_next_launch_accepts_unescaped_plus_offset() {
    let (app, _) = default_router();
    // "+03:00" sent unescaped decodes to " 03:00".
    let resp = get(app, "/next-launch?after=2024-02-03T01:00:00+03:00").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["id"], 102);
}

#[tokio::test]
async fn test_next_launch_requires_after() {
    let (app, _) = default_router();
    for uri in ["/next-launch", "/next-launch?after="] {
        let resp = get(app.clone(), uri).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body_json(resp).await["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn test_next_launch_rejects_bad_timestamp() {
    let (app, _) = default_router();
    let resp = get(app, "/next-launch?after=yesterday").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_next_launch_none_qualifies_is_500() {
    let (app, _) = default_router();
    let resp = get(app, "/next-launch?after=2030-01-01T00:00:00Z").await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], "launch_not_found");
}

#[tokio::test]
async fn test_next_launch_upstream_failure_is_500() {
    let app = router(Arc::new(FakeAllure {
        list_fails: true,
        ..Default::default()
    }));
    let resp = get(app, "/next-launch?after=2024-02-02T22:00:00Z").await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["error"]["code"], "upstream_failed");
}

// ── POST /export/pdf/:id ─────────────────────────────────────

#[tokio::test]
async fn test_generate_report_returns_id_and_link() {
    let (app, fake) = default_router();
    let resp = post_json(
        app,
        "/export/pdf/123",
        r#"{"launchId": 123, "name": "Test Run"}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["report_id"], 456);
    assert_eq!(body["download_link"], format!("{}456", LINK_BASE));
    assert_eq!(
        fake.generated.lock().unwrap().as_slice(),
        &[(123, "Test Run".to_string())]
    );
}

#[tokio::test]
async fn test_generate_report_takes_launch_id_from_path() {
    let (app, fake) = default_router();
    let resp = post_json(app, "/export/pdf/77", r#"{"name": "Nightly"}"#).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(fake.generated.lock().unwrap()[0].0, 77);
}

#[tokio::test]
async fn test_generate_report_forwards_name_as_received() {
    let (app, fake) = default_router();
    let resp = post_json(
        app,
        "/export/pdf/123",
        r#"{"launchId": 123, "name": "  Nightly run "}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(fake.generated.lock().unwrap()[0].1, "  Nightly run ");
}

#[tokio::test]
async fn test_generate_report_bad_requests() {
    let cases = [
        ("/export/pdf/0", r#"{"launchId": 0, "name": "Test Run"}"#),
        ("/export/pdf/123", r#"{"launchId": 123, "name": ""}"#),
        ("/export/pdf/123", r#"{"launchId": 123, "name": "   "}"#),
        ("/export/pdf/123", r#"{"launchId": 456, "name": "Test Run"}"#),
        ("/export/pdf/abc", r#"{"launchId": 123, "name": "Test Run"}"#),
        ("/export/pdf/123", "{not json"),
    ];

    for (uri, body) in cases {
        let (app, fake) = default_router();
        let resp = post_json(app, uri, body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{} {}", uri, body);
        assert!(fake.generated.lock().unwrap().is_empty());
    }
}

// ── Downloads ────────────────────────────────────────────────

#[tokio::test]
async fn test_download_link_endpoint() {
    let (app, _) = default_router();
    let resp = get(app, "/export/download/456").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await["download_link"],
        format!("{}456", LINK_BASE)
    );
}

#[tokio::test]
async fn test_pdf_download_streams_attachment() {
    let (app, _) = default_router();
    let resp = get(app, "/export/pdf/download/456").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=allure-report-456.pdf"
    );
    assert_eq!(&body_bytes(resp).await[..], b"%PDF-1.7 fake");
}

#[tokio::test]
async fn test_pdf_download_upstream_error_is_500() {
    let (app, _) = default_router();
    let resp = get(app, "/export/pdf/download/999").await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["type"], "upstream_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("404"));
}
