use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimeLog {
    #[serde(rename = "id")]
    pub time_log_id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Option<Uuid>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds; `None` while the timer is running.
    pub duration: Option<i64>,
    pub billable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeLog {
    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Whole seconds elapsed between two instants, never negative.
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

/// Manual entry or edit of a time log.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TimeLogInput {
    pub project_id: Option<Uuid>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[validate(range(min = 0, message = "Duration cannot be negative"))]
    pub duration: Option<i64>,
    pub billable: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTimerRequest {
    pub project_id: Option<Uuid>,
    pub description: Option<String>,
    pub billable: Option<bool>,
}

/// Validated values written for a time log row.
#[derive(Debug, Clone)]
pub struct TimeLogFields {
    pub project_id: Option<Uuid>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub billable: bool,
}

/// Tracked seconds: all time, since the start of the trailing week, billable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeLogStats {
    pub total: i64,
    pub this_week: i64,
    pub billable: i64,
}
