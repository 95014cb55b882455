//! Network-backed [`ReportProvider`] for Allure TestOps.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use super::credential::{BearerToken, CredentialCache, TokenGrant};
use super::{CallContext, ReportProvider};
use crate::config::{mask_secret, Config};
use crate::errors::AllureError;
use crate::models::launch::LaunchPage;
use crate::models::report::GenerateReportRequest;
use crate::models::{DownloadedReport, Launch, PdfReport};

const TOKEN_PATH: &str = "/api/uaa/oauth/token";
const LAUNCH_PAGE_SIZE: &str = "100";

/// Client for the Allure TestOps REST API.
///
/// One instance is shared by every request in the process. It owns the
/// bearer credential and refreshes it from the configured API token.
pub struct AllureClient {
    http: Client,
    base_url: String,
    api_prefix: String,
    api_token: Zeroizing<String>,
    project_id: String,
    credential: CredentialCache,
}

impl AllureClient {
    pub fn new(cfg: &Config) -> Result<Self, AllureError> {
        let http = Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(16)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            api_prefix: cfg.api_prefix.clone(),
            api_token: cfg.api_token.clone(),
            project_id: cfg.project_id.clone(),
            credential: CredentialCache::new(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    fn download_url(&self, report_id: &str) -> String {
        self.api_url(&format!(
            "export/download/{}",
            urlencoding::encode(report_id)
        ))
    }

    async fn bearer(&self) -> Result<BearerToken, AllureError> {
        self.credential.ensure_valid(|| self.exchange_token()).await
    }

    /// Trades the long-lived API token for a short-lived bearer token.
    async fn exchange_token(&self) -> Result<TokenGrant, AllureError> {
        tracing::info!(
            api_token = %mask_secret(&self.api_token),
            "refreshing Allure API token"
        );

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "apitoken"),
                ("scope", "openid"),
                ("token", self.api_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("token exchange request failed: {}", e);
                AllureError::refresh_failed(None, &e.to_string())
            })?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| AllureError::refresh_failed(Some(status.as_u16()), &e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token exchange rejected");
            return Err(AllureError::refresh_failed(
                Some(status.as_u16()),
                &String::from_utf8_lossy(&body),
            ));
        }

        // The body holds the new access token, so only the decode error is reported.
        serde_json::from_slice(&body).map_err(|e| {
            AllureError::refresh_failed(
                Some(status.as_u16()),
                &format!("invalid token response: {}", e),
            )
        })
    }

    /// Sends an authenticated request and returns the raw body of a 2xx response.
    async fn send(&self, req: RequestBuilder) -> Result<Bytes, AllureError> {
        let bearer = self.bearer().await?;
        let resp = req.bearer_auth(bearer.as_str()).send().await?;

        let status = resp.status();
        let body = resp.bytes().await?;
        check_status(status, &body)?;
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, AllureError> {
        let body = self.send(req.header(ACCEPT, "application/json")).await?;
        serde_json::from_slice(&body).map_err(|e| AllureError::Decode(e.to_string()))
    }

    async fn fetch_launches(&self) -> Result<Vec<Launch>, AllureError> {
        let req = self.http.get(self.api_url("launch")).query(&[
            ("projectId", self.project_id.as_str()),
            ("page", "0"),
            ("size", LAUNCH_PAGE_SIZE),
        ]);
        let page: LaunchPage = self.send_json(req).await?;
        tracing::debug!(count = page.content.len(), "fetched launches");
        Ok(page.content)
    }

    async fn request_report(
        &self,
        launch_id: i64,
        launch_name: &str,
    ) -> Result<PdfReport, AllureError> {
        tracing::info!(launch_id, "requesting PDF report generation");
        let req = self
            .http
            .post(self.api_url("export/launch/pdf"))
            .json(&GenerateReportRequest {
                launch_id,
                name: launch_name,
                with_page_numbers: true,
            });
        let report: PdfReport = self.send_json(req).await?;
        tracing::info!(
            report_id = report.id,
            status = %report.status,
            "PDF report generation accepted"
        );
        Ok(report)
    }

    async fn fetch_report(&self, report_id: &str) -> Result<DownloadedReport, AllureError> {
        tracing::info!(report_id, "downloading PDF report");
        let content = self.send(self.http.get(self.download_url(report_id))).await?;
        Ok(DownloadedReport {
            file_name: DownloadedReport::file_name_for(report_id),
            content,
        })
    }
}

fn check_status(status: StatusCode, body: &[u8]) -> Result<(), AllureError> {
    if status.is_success() {
        return Ok(());
    }
    tracing::warn!(status = status.as_u16(), "Allure API returned an error");
    Err(AllureError::upstream(
        status.as_u16(),
        &String::from_utf8_lossy(body),
    ))
}

#[async_trait]
impl ReportProvider for AllureClient {
    async fn authenticate(&self, ctx: &CallContext) -> Result<(), AllureError> {
        ctx.run(async { self.bearer().await.map(|_| ()) }).await
    }

    async fn list_launches(&self, ctx: &CallContext) -> Result<Vec<Launch>, AllureError> {
        ctx.run(self.fetch_launches()).await
    }

    async fn generate_report(
        &self,
        ctx: &CallContext,
        launch_id: i64,
        launch_name: &str,
    ) -> Result<PdfReport, AllureError> {
        ctx.run(self.request_report(launch_id, launch_name)).await
    }

    fn download_link(&self, report_id: &str) -> String {
        self.download_url(report_id)
    }

    async fn download_report(
        &self,
        ctx: &CallContext,
        report_id: &str,
    ) -> Result<DownloadedReport, AllureError> {
        ctx.run(self.fetch_report(report_id)).await
    }
}
