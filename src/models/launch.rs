use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A recorded test run in Allure TestOps.
///
/// Timestamps are epoch milliseconds, as the upstream API reports them, and
/// field names stay camelCase on the way back out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Launch {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: i64,
    pub created_date: i64,
    #[serde(default)]
    pub last_modified_date: i64,
}

impl Launch {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_date).single()
    }
}

/// One page of the upstream launch listing.
#[derive(Debug, Deserialize)]
pub(crate) struct LaunchPage {
    #[serde(default)]
    pub content: Vec<Launch>,
}
