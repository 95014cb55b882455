//! Orchestration between HTTP handlers and the upstream provider.
//!
//! Applies per-operation deadlines (metadata vs. download) and forwards the
//! caller's cancellation token to every upstream call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::errors::AllureError;
use crate::models::{DownloadedReport, Launch, PdfReport};
use crate::selector::select_next_launch;
use crate::upstream::{CallContext, ReportProvider};

pub struct ReportService {
    provider: Arc<dyn ReportProvider>,
    metadata_timeout: Duration,
    download_timeout: Duration,
}

impl ReportService {
    pub fn new(provider: Arc<dyn ReportProvider>, cfg: &Config) -> Self {
        Self::with_timeouts(provider, cfg.metadata_timeout, cfg.download_timeout)
    }

    pub fn with_timeouts(
        provider: Arc<dyn ReportProvider>,
        metadata_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            metadata_timeout,
            download_timeout,
        }
    }

    fn metadata_ctx(&self, cancel: &CancellationToken) -> CallContext {
        CallContext::with_cancel(self.metadata_timeout, cancel.clone())
    }

    /// Verifies the upstream accepts our API token.
    pub async fn check_ready(&self, cancel: &CancellationToken) -> Result<(), AllureError> {
        self.provider.authenticate(&self.metadata_ctx(cancel)).await
    }

    /// Finds the launch created closest to, but not before, `after`.
    pub async fn next_launch(
        &self,
        after: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Launch, AllureError> {
        let launches = self
            .provider
            .list_launches(&self.metadata_ctx(cancel))
            .await
            .inspect_err(|e| tracing::error!("failed to list launches: {}", e))?;

        if launches.is_empty() {
            tracing::warn!("no launches to search");
        }

        let launch = select_next_launch(&launches, after)?.clone();
        tracing::info!(
            launch_id = launch.id,
            name = %launch.name,
            created_at = ?launch.created_at(),
            after = %after.to_rfc3339(),
            "found next launch"
        );
        Ok(launch)
    }

    pub async fn generate_report(
        &self,
        launch_id: i64,
        launch_name: &str,
        cancel: &CancellationToken,
    ) -> Result<PdfReport, AllureError> {
        let report = self
            .provider
            .generate_report(&self.metadata_ctx(cancel), launch_id, launch_name)
            .await
            .inspect_err(|e| tracing::error!(launch_id, "PDF report generation failed: {}", e))?;

        tracing::info!(report_id = report.id, name = %report.name, "PDF report generated");
        Ok(report)
    }

    pub fn download_link(&self, report_id: &str) -> String {
        self.provider.download_link(report_id)
    }

    pub async fn download_report(
        &self,
        report_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedReport, AllureError> {
        let ctx = CallContext::with_cancel(self.download_timeout, cancel.clone());
        let report = self
            .provider
            .download_report(&ctx, report_id)
            .await
            .inspect_err(|e| tracing::error!(report_id, "PDF report download failed: {}", e))?;

        tracing::info!(
            file_name = %report.file_name,
            bytes = report.content.len(),
            "PDF report downloaded"
        );
        Ok(report)
    }
}
