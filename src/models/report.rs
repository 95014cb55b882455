use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A PDF export job as returned by `export/launch/pdf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfReport {
    pub id: i64,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub storage_key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_date: i64,
}

/// Body of the report generation request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateReportRequest<'a> {
    pub launch_id: i64,
    pub name: &'a str,
    pub with_page_numbers: bool,
}

/// Raw PDF content plus the file name offered to the browser.
#[derive(Debug, Clone)]
pub struct DownloadedReport {
    pub file_name: String,
    pub content: Bytes,
}

impl DownloadedReport {
    pub fn file_name_for(report_id: &str) -> String {
        format!("allure-report-{}.pdf", report_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_field_maps_to_kind() {
        let report: PdfReport = serde_json::from_str(
            r#"{"id":456,"projectId":1661,"type":"pdf","status":"generated","storageKey":"k/456","name":"Test Run","createdDate":1}"#,
        )
        .unwrap();
        assert_eq!(report.kind, "pdf");
        assert_eq!(report.storage_key, "k/456");
    }

    #[test]
    fn test_generate_request_shape() {
        let body = serde_json::to_value(GenerateReportRequest {
            launch_id: 123,
            name: "Test Run",
            with_page_numbers: true,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"launchId": 123, "name": "Test Run", "withPageNumbers": true})
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(DownloadedReport::file_name_for("456"), "allure-report-456.pdf");
    }
}
