use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One attendance-capture window for a class meeting.
///
/// Created active, mutated only through rotation, ending, and accepted
/// submissions, and never deleted. `active` is a one-way transition: once
/// a session ends it stays ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub subject_name: String,
    pub total_students: u32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub ttl_seconds: u32,
    pub current_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub token_issued_at: DateTime<Utc>,
    pub scanned_count: u64,
    /// Subjects flagged by the late-scan rule; append-only, deduplicated.
    pub misbehaved: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.token_expires_at
    }

    /// A scan counts as late when it lands strictly more than `threshold`
    /// after the current token was issued.
    pub fn is_late(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.token_issued_at > threshold
    }
}

/// One accepted scan. Immutable once written; attendance is a historical
/// fact, so there is no update or delete anywhere in the crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub id: String,
    pub user_id: String,
    /// The token that was current at submission time, kept for audit.
    pub token: String,
    pub created_at: DateTime<Utc>,
}
