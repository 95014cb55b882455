//! Allure TestOps upstream access.
//!
//! [`ReportProvider`] is the contract the rest of the service programs
//! against. [`AllureClient`] is the network-backed implementation; it keeps a
//! single bearer credential in a [`credential::CredentialCache`] and refreshes
//! it before any call that would otherwise use an expiring token.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::AllureError;
use crate::models::{DownloadedReport, Launch, PdfReport};

pub mod client;
pub(crate) mod credential;

pub use client::AllureClient;

/// Launch and report operations offered by the upstream system.
#[async_trait]
pub trait ReportProvider: Send + Sync {
    /// Makes sure a usable bearer credential is cached.
    async fn authenticate(&self, ctx: &CallContext) -> Result<(), AllureError>;

    /// First page (up to 100 entries) of launches for the configured project,
    /// in upstream order.
    async fn list_launches(&self, ctx: &CallContext) -> Result<Vec<Launch>, AllureError>;

    /// Asks the upstream to render a PDF report for a launch.
    async fn generate_report(
        &self,
        ctx: &CallContext,
        launch_id: i64,
        launch_name: &str,
    ) -> Result<PdfReport, AllureError>;

    /// URL the generated PDF can be fetched from. No network access.
    fn download_link(&self, report_id: &str) -> String;

    async fn download_report(
        &self,
        ctx: &CallContext,
        report_id: &str,
    ) -> Result<DownloadedReport, AllureError>;
}

/// Deadline and cancellation signal for a single upstream operation.
///
/// The credential refresh and the call it guards share one deadline.
#[derive(Debug, Clone)]
pub struct CallContext {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new(timeout: Duration) -> Self {
        Self::with_cancel(timeout, CancellationToken::new())
    }

    pub fn with_cancel(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drives `fut` to completion unless the deadline passes or the caller cancels.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, AllureError>
    where
        F: Future<Output = Result<T, AllureError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AllureError::Cancelled),
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(AllureError::Timeout(self.timeout)),
            },
        }
    }
}
