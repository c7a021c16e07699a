use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::Category;
use crate::constants::{report_ttl, TIMESTAMP_BUCKET_MINUTES, UNKNOWN_LANGUAGE};

/// An anonymous incident report, as held by the server's report store.
///
/// `created_at` is coarsened so that reports cannot be correlated by exact
/// submission time. `expires_at` is derived from the precise submission
/// instant, so `expires_at - created_at` varies within one bucket width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub zone: String,
    pub content: String,
    pub language: String,
    pub has_photo: bool,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Report {
    /// Build a report submitted at `now`. `content` must already be
    /// sanitized.
    pub fn new(
        zone: String,
        content: String,
        language: Option<String>,
        has_photo: bool,
        category: Category,
        now: DateTime<Utc>,
    ) -> Self {
        let language = language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        Self {
            id: Uuid::new_v4(),
            zone,
            content,
            language,
            has_photo,
            category,
            created_at: fuzz_timestamp(now),
            expires_at: now + report_ttl(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn view(&self) -> ReportView {
        ReportView::from(self)
    }
}

/// Floor a timestamp to the start of its bucket.
pub fn fuzz_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    let bucket = Duration::minutes(TIMESTAMP_BUCKET_MINUTES);
    // duration_trunc only fails for out-of-range timestamps
    ts.duration_trunc(bucket).unwrap_or(ts)
}

/// Client-facing projection of a [`Report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub id: Uuid,
    pub zone: String,
    pub content: String,
    pub language: String,
    pub has_photo: bool,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl From<&Report> for ReportView {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id,
            zone: report.zone.clone(),
            content: report.content.clone(),
            language: report.language.clone(),
            has_photo: report.has_photo,
            category: report.category,
            timestamp: report.created_at,
            expires: report.expires_at,
        }
    }
}
