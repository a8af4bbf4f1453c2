//! Job model for the shared scrape queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "scrape_job_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapeJobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

// ============================================================================
// Model
// ============================================================================

/// One row of `scraper_queue`.
///
/// `url`, `owner_id` and `position_id` are immutable; the status columns only
/// move through `JobStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ScrapeJob {
    pub id: Uuid,
    pub url: String,
    pub owner_id: Uuid,
    pub position_id: Uuid,
    /// W3C `traceparent` of the enqueuing request, passed through untouched.
    pub trace_context: Option<String>,
    pub status: ScrapeJobStatus,
    pub attempt_count: i32,
    pub result_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeJob {
    /// Build a fresh `PENDING` job, as an upstream producer would insert it.
    pub fn pending(url: impl Into<String>, owner_id: Uuid, position_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            url: url.into(),
            owner_id,
            position_id,
            trace_context: None,
            status: ScrapeJobStatus::Pending,
            attempt_count: 0,
            result_key: None,
            error_message: None,
            created_at: now,
            started_at: None,
            updated_at: now,
        }
    }

    pub fn with_trace_context(mut self, trace_context: impl Into<String>) -> Self {
        self.trace_context = Some(trace_context.into());
        self
    }
}
