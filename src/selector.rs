//! Nearest-launch selection.

use chrono::{DateTime, Utc};

use crate::errors::AllureError;
use crate::models::Launch;

/// Picks the earliest launch created at or after `after`.
///
/// Launches created at the same millisecond resolve to the lowest id, so the
/// answer does not depend on the order the upstream listed them in.
pub fn select_next_launch(
    launches: &[Launch],
    after: DateTime<Utc>,
) -> Result<&Launch, AllureError> {
    if launches.is_empty() {
        return Err(AllureError::NotFound("no launches available".into()));
    }

    let after_ms = after.timestamp_millis();

    // Smallest non-negative offset is the smallest creation time past the cutoff.
    launches
        .iter()
        .filter(|l| l.created_date >= after_ms)
        .min_by_key(|l| (l.created_date, l.id))
        .ok_or_else(|| {
            AllureError::NotFound(format!(
                "no launch created at or after {}",
                after.to_rfc3339()
            ))
        })
}
